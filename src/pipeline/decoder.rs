//! QR decoding. A frame either yields one payload string or nothing; any
//! decode failure is reported as nothing.

use image::ImageFormat;
use tracing::trace;

use super::source::{Frame, FrameFormat};

pub trait QrDecoder: Send + Sync + 'static {
    /// First payload found in the frame, if any.
    fn decode(&self, frame: &Frame) -> Option<String>;

    fn decoder_name(&self) -> &str;

    /// Whether decoding `frame` is heavy enough to move off the runtime.
    fn is_blocking(&self, frame: &Frame) -> bool {
        frame.format == FrameFormat::Jpeg
    }
}

/// Decodes QR codes from JPEG frames (grayscale conversion, then `rqrr`).
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        if frame.format != FrameFormat::Jpeg {
            return None;
        }
        let image = match image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg) {
            Ok(image) => image.to_luma8(),
            Err(e) => {
                trace!(sequence = frame.sequence, error = %e, "Undecodable JPEG frame");
                return None;
            }
        };

        let (width, height) = image.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                image.get_pixel(x as u32, y as u32).0[0]
            });

        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| grid.decode().ok().map(|(_meta, content)| content))
    }

    fn decoder_name(&self) -> &str {
        "rqrr"
    }
}

/// Reads the text carried by scripted frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadDecoder;

impl QrDecoder for PayloadDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        if frame.format != FrameFormat::Payload {
            return None;
        }
        std::str::from_utf8(&frame.data)
            .ok()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
    }

    fn decoder_name(&self) -> &str {
        "payload"
    }
}
