use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AlertConfig;
use crate::traits::AlertExporter;
use crate::types::AlertReading;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub description: String,
    pub state: bool,
    pub cooldown: bool,
    pub trigger_time: Option<DateTime<Utc>>,
}

impl Alert {
    fn new(description: String) -> Self {
        Self {
            description,
            state: false,
            cooldown: false,
            trigger_time: None,
        }
    }
}

/// Tracks boolean alert rules and exports their state after every update.
///
/// A rising edge arms a cooldown window; the cooldown clears on the first
/// update after the window has elapsed. The exported `state` always follows
/// the latest input and is not masked by the cooldown.
pub struct AlertMonitor {
    alerts: HashMap<String, Alert>,
    cooldown: Duration,
    exporter: Arc<dyn AlertExporter>,
}

impl AlertMonitor {
    /// A zero `cooldown` disables the cooldown bookkeeping.
    pub fn new(cooldown: Duration, exporter: Arc<dyn AlertExporter>) -> Self {
        Self {
            alerts: HashMap::new(),
            cooldown,
            exporter,
        }
    }

    pub fn from_config(config: &AlertConfig, exporter: Arc<dyn AlertExporter>) -> Self {
        let cooldown = i64::try_from(config.cooldown_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self::new(cooldown, exporter)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn alert(&self, key: &str) -> Option<&Alert> {
        self.alerts.get(key)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Replace the whole alert set, e.g. `{"r0": "is there fire?"}`.
    ///
    /// The previous set is exported once more with every state forced to 0
    /// so stale gauges do not keep reporting an active alert.
    pub fn define_alerts<I, K, D>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<String>,
    {
        let previous = std::mem::take(&mut self.alerts);
        if !previous.is_empty() {
            let retired: Vec<AlertReading> = sorted_readings(&previous)
                .into_iter()
                .map(|reading| AlertReading {
                    state: false,
                    ..reading
                })
                .collect();
            self.exporter.export(&retired);
        }

        self.alerts = definitions
            .into_iter()
            .map(|(key, description)| (key.into(), Alert::new(description.into())))
            .collect();
        info!("Defined {} alert rule(s)", self.alerts.len());
    }

    /// Apply one tick of rule results, e.g. `[("r0", true), ("r1", false)]`.
    ///
    /// Keys that are not defined are ignored. The full set is exported
    /// afterwards, including alerts that were absent from the batch.
    pub fn update<I, K>(&mut self, batch: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        let cooldown_enabled = self.cooldown > Duration::zero();

        for (key, new_state) in batch {
            let key = key.as_ref();
            let alert = match self.alerts.get_mut(key) {
                Some(alert) => alert,
                None => {
                    debug!(alert = %key, "Ignoring state for undefined alert");
                    continue;
                }
            };

            if cooldown_enabled {
                if alert.cooldown {
                    let expired = alert
                        .trigger_time
                        .map(|triggered| now - triggered > self.cooldown)
                        .unwrap_or(true);
                    if expired {
                        alert.cooldown = false;
                        alert.trigger_time = None;
                        debug!(alert = %key, "Cooldown expired");
                    }
                } else if new_state {
                    alert.cooldown = true;
                    alert.trigger_time = Some(now);
                    info!(alert = %key, description = %alert.description, "Alert triggered");
                }
            }

            alert.state = new_state;
        }

        self.export();
    }

    pub fn update_now<I, K>(&mut self, batch: I)
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        self.update(batch, Utc::now());
    }

    /// Force every alert to 0 and export. Cooldowns are left as they are.
    pub fn clear_all(&mut self) {
        for alert in self.alerts.values_mut() {
            alert.state = false;
        }
        self.export();
    }

    pub fn snapshot(&self) -> Vec<AlertReading> {
        sorted_readings(&self.alerts)
    }

    fn export(&self) {
        self.exporter.export(&self.snapshot());
    }
}

fn sorted_readings(alerts: &HashMap<String, Alert>) -> Vec<AlertReading> {
    let mut readings: Vec<AlertReading> = alerts
        .iter()
        .map(|(key, alert)| AlertReading {
            key: key.clone(),
            description: alert.description.clone(),
            state: alert.state,
        })
        .collect();
    readings.sort_by(|a, b| a.key.cmp(&b.key));
    readings
}
