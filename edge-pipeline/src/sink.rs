use std::time::Duration;

use interfaces::{black_frame, OutputStream, VideoOutput};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SinkConfig;
use crate::types::{Frame, PipelineError, RenderOptions, Result};

/// Persistent output stream fed through a bounded relay queue.
///
/// One background task per sink publishes whatever arrives on the queue and
/// falls back to a black frame whenever nothing shows up within the frame
/// timeout, so the published stream never stops advancing.
pub struct FrameSink {
    url: String,
    sender: mpsc::Sender<Frame>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl FrameSink {
    /// Open the output at `url` and start the publishing task.
    pub async fn open(
        output: &dyn VideoOutput,
        url: &str,
        options: &RenderOptions,
        config: SinkConfig,
    ) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "relay queue capacity must be at least 1".to_string(),
            ));
        }

        let stream = output.open(url, options).await?;
        let fallback = black_frame(
            config.fallback_width,
            config.fallback_height,
            config.fallback_format.into(),
        );

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = PublishWorker {
            url: url.to_string(),
            stream,
            receiver,
            fallback,
            timeout: config.frame_timeout(),
        };
        let task = tokio::spawn(worker.run(shutdown_rx));

        info!(
            url = %url,
            capacity = config.queue_capacity,
            "Opened output stream"
        );

        Ok(Self {
            url: url.to_string(),
            sender,
            shutdown,
            task: Some(task),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a frame for publication, waiting while the relay queue is full.
    pub async fn submit(&self, frame: Frame) -> Result<()> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| PipelineError::SinkClosed {
                url: self.url.clone(),
            })
    }

    /// Frames waiting in the relay queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stop the publishing task and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(url = %self.url, "Publishing task ended abnormally: {}", e);
            }
        }
        info!(url = %self.url, "Output stream stopped");
    }
}

struct PublishWorker {
    url: String,
    stream: Box<dyn OutputStream>,
    receiver: mpsc::Receiver<Frame>,
    fallback: Frame,
    timeout: Duration,
}

impl PublishWorker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                next = tokio::time::timeout(self.timeout, self.receiver.recv()) => next,
            };

            let rendered = match next {
                Ok(Some(frame)) => {
                    let result = self.stream.render(&frame).await;
                    if result.is_ok() {
                        metrics::counter!("edge_sink_published_frames_total").increment(1);
                    }
                    result
                }
                Ok(None) => {
                    debug!(url = %self.url, "Relay queue closed");
                    break;
                }
                Err(_) => {
                    let result = self.stream.render(&self.fallback).await;
                    if result.is_ok() {
                        metrics::counter!("edge_sink_fallback_frames_total").increment(1);
                    }
                    result
                }
            };

            if let Err(e) = rendered {
                warn!(url = %self.url, "Failed to render frame: {}", e);
                tokio::time::sleep(self.timeout).await;
            }
        }
    }
}
