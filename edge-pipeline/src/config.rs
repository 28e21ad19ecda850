use std::path::Path;
use std::time::Duration;

use interfaces::fallback::{FALLBACK_HEIGHT, FALLBACK_WIDTH};
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, PixelFormat, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub connect_retries: u32,
    pub capture_retries: u32,
    pub retry_delay_ms: u64,
}

impl SourceConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connect_retries: 5,
            capture_retries: 8,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackFormat {
    Rgb8,
    Rgba8,
    Bgr8,
    Gray8,
}

impl From<FallbackFormat> for PixelFormat {
    fn from(format: FallbackFormat) -> Self {
        match format {
            FallbackFormat::Rgb8 => PixelFormat::Rgb8,
            FallbackFormat::Rgba8 => PixelFormat::Rgba8,
            FallbackFormat::Bgr8 => PixelFormat::Bgr8,
            FallbackFormat::Gray8 => PixelFormat::Gray8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub queue_capacity: usize,
    pub frame_timeout_ms: u64,
    pub fallback_width: u32,
    pub fallback_height: u32,
    pub fallback_format: FallbackFormat,
}

impl SinkConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 3,
            frame_timeout_ms: 200,
            fallback_width: FALLBACK_WIDTH,
            fallback_height: FALLBACK_HEIGHT,
            fallback_format: FallbackFormat::Rgb8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub base_url: String,
    pub user_agent: String,
    /// `None` keeps the transport default (no timeout). A backend that never
    /// answers then holds the dispatcher busy indefinitely.
    pub request_timeout_seconds: Option<u64>,
    pub jpeg_quality: u8,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://0.0.0.0:5015".to_string(),
            user_agent: "edge-pipeline/0.1".to_string(),
            request_timeout_seconds: None,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Zero disables cooldown bookkeeping.
    pub cooldown_seconds: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub dispatch: DispatchConfig,
    pub alerts: AlertConfig,
    pub telemetry: TelemetryConfig,
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "sink.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.sink.frame_timeout_ms == 0 {
            return Err(PipelineError::Config(
                "sink.frame_timeout_ms must be positive".to_string(),
            ));
        }
        if self.sink.fallback_width == 0 || self.sink.fallback_height == 0 {
            return Err(PipelineError::Config(
                "sink fallback frame needs a non-zero resolution".to_string(),
            ));
        }
        if !(1..=100).contains(&self.dispatch.jpeg_quality) {
            return Err(PipelineError::Config(format!(
                "dispatch.jpeg_quality must be within 1..=100, got {}",
                self.dispatch.jpeg_quality
            )));
        }
        Ok(())
    }
}
