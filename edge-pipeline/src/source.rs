use std::sync::Arc;

use backoff::backoff::{Backoff, Constant};
use chrono::Utc;
use interfaces::{InputStream, VideoInput};
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::types::{ConnectionState, Frame, StreamEndpoint};

/// Pulls frames from a remote stream and keeps itself connected.
///
/// Connection problems never escape as errors: they degrade to "no frame"
/// (`None`) and the source tries to heal itself on the next read failure.
/// Retries use a fixed delay so the worst-case stall stays bounded.
pub struct FrameSource {
    input: Arc<dyn VideoInput>,
    config: SourceConfig,
    stream: Option<Box<dyn InputStream>>,
    endpoint: Option<StreamEndpoint>,
}

impl FrameSource {
    pub fn new(input: Arc<dyn VideoInput>, config: SourceConfig) -> Self {
        Self {
            input,
            config,
            stream: None,
            endpoint: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        // `stream` and `endpoint` are only ever set together.
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> Option<&StreamEndpoint> {
        self.endpoint.as_ref()
    }

    /// Connect with the configured retry budget and no name or id.
    pub async fn open(&mut self, url: &str) -> bool {
        let retries = self.config.connect_retries;
        self.connect(url, retries, "", "").await
    }

    /// Drop the current stream (if any) and attach to `url`.
    ///
    /// Makes up to `max_retries + 1` attempts with a fixed delay between
    /// failures. Returns whether the source ended up connected.
    pub async fn connect(&mut self, url: &str, max_retries: u32, name: &str, id: &str) -> bool {
        self.close().await;

        let mut backoff = Constant::new(self.config.retry_delay());

        for attempt in 0..=max_retries {
            match self.input.open(url).await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.endpoint = Some(StreamEndpoint {
                        url: url.to_string(),
                        name: name.to_string(),
                        id: id.to_string(),
                        connected_at: Utc::now(),
                    });
                    info!(url = %url, name = %name, "Successfully connected to stream");
                    return true;
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        "Failed to create video source (attempt {}/{}): {}",
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    if attempt < max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        error!(url = %url, "Failed to connect to stream after {} attempts", max_retries + 1);
        false
    }

    /// Read a frame with the configured retry budget.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let retries = self.config.capture_retries;
        self.capture(retries).await
    }

    /// Read the most recent frame.
    ///
    /// Returns `None` right away when not connected. When every attempt fails
    /// the source reconnects to its last endpoint and still returns `None`;
    /// the caller gets a frame on a later call.
    pub async fn capture(&mut self, max_retries: u32) -> Option<Frame> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => {
                debug!("Capture requested while not connected to a stream");
                return None;
            }
        };

        let mut last_error = None;
        for _ in 0..max_retries {
            match stream.capture().await {
                Ok(frame) => return Some(frame),
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no capture attempts allowed".to_string());
        error!("Failed to get frame from input stream ({}). Reconnecting.", reason);

        if let Some(endpoint) = self.endpoint.clone() {
            let retries = self.config.connect_retries;
            self.connect(&endpoint.url, retries, &endpoint.name, &endpoint.id)
                .await;
        }
        None
    }

    /// Close the current stream. Safe to call when already disconnected.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let url = self
                .endpoint
                .as_ref()
                .map(|endpoint| endpoint.url.clone())
                .unwrap_or_default();
            if let Err(e) = stream.close().await {
                error!(url = %url, "Failed to close stream: {}", e);
            } else {
                debug!(url = %url, "Closed stream");
            }
        }
        self.endpoint = None;
    }
}
