//! Logging setup and the Prometheus side of alert export.

use std::net::{Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::traits::AlertExporter;
use crate::types::{AlertReading, PipelineError, Result};

pub const ALERT_GAUGE: &str = "alert_status";

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install the global metrics recorder and serve `/metrics` on `port`.
///
/// Needs a running tokio runtime for the HTTP listener.
pub fn install_prometheus(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PipelineError::Config(format!("failed to start metrics server: {}", e)))?;
    metrics::describe_gauge!(ALERT_GAUGE, "Alert rule state (1 = active)");
    info!("Serving Prometheus metrics on {}", addr);
    Ok(())
}

/// Sets `alert_status{alert_number, alert_string}` for every reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusAlertExporter;

impl AlertExporter for PrometheusAlertExporter {
    fn export(&self, readings: &[AlertReading]) {
        for reading in readings {
            metrics::gauge!(
                ALERT_GAUGE,
                "alert_number" => reading.key.clone(),
                "alert_string" => reading.description.clone()
            )
            .set(reading.numeric_state());
        }
    }
}
