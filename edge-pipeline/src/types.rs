use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use interfaces::{Frame, PixelFormat, RenderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// The stream a `FrameSource` is currently attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    pub url: String,
    pub name: String,
    pub id: String,
    pub connected_at: DateTime<Utc>,
}

/// One alert as handed to the metrics exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReading {
    pub key: String,
    pub description: String,
    pub state: bool,
}

impl AlertReading {
    pub fn numeric_state(&self) -> f64 {
        if self.state {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Media error: {0}")]
    Media(#[from] anyhow::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("objects and bboxes not the same length: {objects} objects, {bboxes} bboxes")]
    SchemaMismatch { objects: usize, bboxes: usize },

    #[error("Relay queue for {url} is closed")]
    SinkClosed { url: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
