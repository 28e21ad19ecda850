use std::collections::HashMap;

use anyhow::{ensure, Result};
use async_trait::async_trait;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgr8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Raw image buffer handed between the media layer and the pipeline.
///
/// A frame has no identity of its own: whoever holds it owns it, and it is
/// moved (not shared) from the capture side to the publish/inference side.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        ensure!(
            data.len() == expected,
            "frame buffer holds {} bytes, {}x{} {:?} needs {}",
            data.len(),
            width,
            height,
            format,
            expected
        );
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Free-form options passed through to the output backend (e.g. `save`).
pub type RenderOptions = HashMap<String, String>;

/// Opens live video streams. Implemented by the external media layer.
#[async_trait]
pub trait VideoInput: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn InputStream>>;
}

/// An open input stream.
#[async_trait]
pub trait InputStream: Send {
    /// Read the next frame. Errors are transient from the caller's point of view.
    async fn capture(&mut self) -> Result<Frame>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens persistent output streams (RTSP, file, display).
#[async_trait]
pub trait VideoOutput: Send + Sync {
    async fn open(&self, url: &str, options: &RenderOptions) -> Result<Box<dyn OutputStream>>;
}

#[async_trait]
pub trait OutputStream: Send {
    async fn render(&mut self, frame: &Frame) -> Result<()>;
}

// Implementations of these traits live outside this workspace (hardware
// decoders, RTSP servers). The pipeline only ever sees the boxed handles and
// treats every error they return as recoverable.
