use crate::types::AlertReading;

/// Receives the full alert set after every change.
///
/// Implementations get a consistent snapshot; they must not call back into
/// the monitor that produced it.
pub trait AlertExporter: Send + Sync {
    fn export(&self, readings: &[AlertReading]);
}

/// Exporter that drops every reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardExporter;

impl AlertExporter for DiscardExporter {
    fn export(&self, _readings: &[AlertReading]) {}
}
