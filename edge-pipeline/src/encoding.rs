use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::types::{Frame, PipelineError, PixelFormat, Result};

/// Encode a frame as JPEG. Alpha is dropped, BGR is swizzled to RGB.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);

    match frame.format {
        PixelFormat::Gray8 => {
            let image = GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or_else(|| short_buffer(frame))?;
            encoder.encode_image(&image)?;
        }
        _ => {
            let image = to_rgb_image(frame)?;
            encoder.encode_image(&image)?;
        }
    }

    Ok(buf)
}

/// `data:image/jpeg;base64,...` URL suitable for an `image_url` content part.
pub fn jpeg_data_url(frame: &Frame, quality: u8) -> Result<String> {
    let jpeg = encode_jpeg(frame, quality)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
    Ok(format!("data:image/jpeg;base64,{}", encoded))
}

pub fn frame_from_image(image: DynamicImage) -> Frame {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame {
        width,
        height,
        format: PixelFormat::Rgb8,
        data: rgb.into_raw(),
    }
}

fn to_rgb_image(frame: &Frame) -> Result<RgbImage> {
    let expected = frame.width as usize * frame.height as usize * frame.format.channels();
    if frame.data.len() < expected {
        return Err(short_buffer(frame));
    }
    let pixels = &frame.data[..expected];

    let data = match frame.format {
        PixelFormat::Rgb8 => pixels.to_vec(),
        PixelFormat::Bgr8 => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect(),
        PixelFormat::Rgba8 => pixels
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect(),
        PixelFormat::Gray8 => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
    };

    RgbImage::from_raw(frame.width, frame.height, data).ok_or_else(|| short_buffer(frame))
}

fn short_buffer(frame: &Frame) -> PipelineError {
    PipelineError::InvalidFrame(format!(
        "{}x{} {:?} frame with only {} bytes",
        frame.width,
        frame.height,
        frame.format,
        frame.data.len()
    ))
}
