use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use crate::defs::Frame;
use crate::defs::OutputStream;
use crate::defs::RenderOptions;
use crate::defs::VideoOutput;

/// Output that accepts every frame and throws it away.
///
/// Stands in for the real encoder when a pipeline runs headless; keeps a
/// count of rendered frames across every stream it opened.
#[derive(Clone, Default)]
pub struct NullOutput {
    rendered: Arc<AtomicU64>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }
}

struct NullStream {
    rendered: Arc<AtomicU64>,
}

#[async_trait]
impl VideoOutput for NullOutput {
    async fn open(&self, _url: &str, _options: &RenderOptions) -> Result<Box<dyn OutputStream>> {
        Ok(Box::new(NullStream {
            rendered: self.rendered.clone(),
        }))
    }
}

#[async_trait]
impl OutputStream for NullStream {
    async fn render(&mut self, _frame: &Frame) -> Result<()> {
        // Nothing matters, every frame is dropped.
        self.rendered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
