mod common;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::init_tracing;
use edge_pipeline::config::AlertConfig;
use edge_pipeline::traits::DiscardExporter;
use edge_pipeline::{AlertExporter, AlertMonitor, AlertReading};

#[derive(Default)]
struct RecordingExporter {
    exports: Mutex<Vec<Vec<AlertReading>>>,
}

impl RecordingExporter {
    fn last(&self) -> Vec<AlertReading> {
        self.exports.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn count(&self) -> usize {
        self.exports.lock().unwrap().len()
    }
}

impl AlertExporter for RecordingExporter {
    fn export(&self, readings: &[AlertReading]) {
        self.exports.lock().unwrap().push(readings.to_vec());
    }
}

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
}

fn states(readings: &[AlertReading]) -> Vec<(&str, bool)> {
    readings.iter().map(|r| (r.key.as_str(), r.state)).collect()
}

fn fire_and_smoke(cooldown_seconds: i64) -> (AlertMonitor, Arc<RecordingExporter>) {
    let exporter = Arc::new(RecordingExporter::default());
    let mut monitor = AlertMonitor::new(Duration::seconds(cooldown_seconds), exporter.clone());
    monitor.define_alerts([("r0", "is there fire?"), ("r1", "is there smoke?")]);
    (monitor, exporter)
}

#[test]
fn test_cooldown_window_lifecycle() {
    init_tracing();

    let (mut monitor, exporter) = fire_and_smoke(5);

    monitor.update([("r0", true)], at(0));
    let r0 = monitor.alert("r0").unwrap();
    assert!(r0.state);
    assert!(r0.cooldown);
    assert_eq!(r0.trigger_time, Some(at(0)));

    monitor.update([("r0", true)], at(3));
    let r0 = monitor.alert("r0").unwrap();
    assert!(r0.cooldown);
    assert_eq!(r0.trigger_time, Some(at(0)));

    monitor.update([("r0", false)], at(6));
    let r0 = monitor.alert("r0").unwrap();
    assert!(!r0.state);
    assert!(!r0.cooldown);
    assert_eq!(r0.trigger_time, None);

    assert_eq!(exporter.count(), 3);
    assert_eq!(states(&exporter.last()), vec![("r0", false), ("r1", false)]);
}

#[test]
fn test_expiry_clears_cooldown_even_when_still_active() {
    init_tracing();

    let (mut monitor, _exporter) = fire_and_smoke(5);
    monitor.update([("r0", true)], at(0));
    monitor.update([("r0", true)], at(10));

    let r0 = monitor.alert("r0").unwrap();
    assert!(r0.state);
    assert!(!r0.cooldown);
    assert_eq!(r0.trigger_time, None);

    // The next rising tick re-arms.
    monitor.update([("r0", true)], at(11));
    assert_eq!(monitor.alert("r0").unwrap().trigger_time, Some(at(11)));
}

#[test]
fn test_state_is_not_masked_by_cooldown() {
    init_tracing();

    let (mut monitor, exporter) = fire_and_smoke(60);
    monitor.update([("r1", true)], at(0));
    monitor.update([("r1", false)], at(1));
    monitor.update([("r1", true)], at(2));

    assert_eq!(states(&exporter.last()), vec![("r0", false), ("r1", true)]);
    assert_eq!(monitor.alert("r1").unwrap().trigger_time, Some(at(0)));
}

#[test]
fn test_unknown_keys_are_ignored_and_absent_keys_reexported() {
    init_tracing();

    let (mut monitor, exporter) = fire_and_smoke(5);
    monitor.update([("r1", true)], at(0));
    monitor.update([("r9", true)], at(1));

    assert_eq!(monitor.len(), 2);
    assert!(monitor.alert("r9").is_none());

    let last = exporter.last();
    assert_eq!(states(&last), vec![("r0", false), ("r1", true)]);
    assert_eq!(last[1].description, "is there smoke?");
    assert_eq!(last[1].numeric_state(), 1.0);
}

#[test]
fn test_redefining_alerts_retires_previous_set() {
    init_tracing();

    let (mut monitor, exporter) = fire_and_smoke(5);
    monitor.update([("r0", true), ("r1", true)], at(0));
    let before = exporter.count();

    monitor.define_alerts([("r0", "is the door open?")]);

    assert_eq!(exporter.count(), before + 1);
    let retired = exporter.last();
    assert_eq!(states(&retired), vec![("r0", false), ("r1", false)]);
    assert_eq!(retired[0].description, "is there fire?");

    let r0 = monitor.alert("r0").unwrap();
    assert_eq!(r0.description, "is the door open?");
    assert!(!r0.state);
    assert!(!r0.cooldown);
    assert_eq!(monitor.len(), 1);
}

#[test]
fn test_clear_all_zeroes_state_but_keeps_cooldown() {
    init_tracing();

    let (mut monitor, exporter) = fire_and_smoke(5);
    monitor.update([("r0", true)], at(0));
    monitor.clear_all();

    let r0 = monitor.alert("r0").unwrap();
    assert!(!r0.state);
    assert!(r0.cooldown);
    assert_eq!(r0.trigger_time, Some(at(0)));
    assert_eq!(states(&exporter.last()), vec![("r0", false), ("r1", false)]);
}

#[test]
fn test_zero_cooldown_disables_bookkeeping() {
    init_tracing();

    let exporter = Arc::new(RecordingExporter::default());
    let config = AlertConfig { cooldown_seconds: 0 };
    let mut monitor = AlertMonitor::from_config(&config, exporter.clone());
    monitor.define_alerts([("r0", "is there fire?")]);

    monitor.update([("r0", true)], at(0));
    let r0 = monitor.alert("r0").unwrap();
    assert!(r0.state);
    assert!(!r0.cooldown);
    assert_eq!(r0.trigger_time, None);
    assert_eq!(states(&exporter.last()), vec![("r0", true)]);
}

#[test]
fn test_first_definition_exports_nothing() {
    init_tracing();

    let exporter = Arc::new(RecordingExporter::default());
    let mut monitor = AlertMonitor::new(Duration::seconds(5), exporter.clone());
    assert!(monitor.is_empty());
    monitor.define_alerts([("r0", "is there fire?")]);
    assert_eq!(exporter.count(), 0);

    let silent = AlertMonitor::new(Duration::seconds(5), Arc::new(DiscardExporter));
    assert!(silent.snapshot().is_empty());
}
