use crate::defs::Frame;
use crate::defs::PixelFormat;

pub const FALLBACK_WIDTH: u32 = 1920;
pub const FALLBACK_HEIGHT: u32 = 1080;

/// All-zero frame published when no fresh frame is available.
///
/// Zero bytes are black for every supported format except `Rgba8`, where the
/// alpha channel is set to opaque so the output does not turn transparent.
pub fn black_frame(width: u32, height: u32, format: PixelFormat) -> Frame {
    let pixels = width as usize * height as usize;
    let mut data = vec![0u8; pixels * format.channels()];
    if format == PixelFormat::Rgba8 {
        for pixel in data.chunks_exact_mut(4) {
            pixel[3] = u8::MAX;
        }
    }
    Frame {
        width,
        height,
        format,
        data,
    }
}
