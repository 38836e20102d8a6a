//! Image decoding through an ordered chain of candidate decoders.
//!
//! # Module layout
//!
//! - [`chain`] -- [`DecodeChain`]: format detection, candidate ordering and
//!   the GIF escalation rule.
//! - [`image_decoders`] -- General-purpose candidates backed by the `image`
//!   crate.
//! - [`gif`] -- The lenient last-resort GIF decoder.

pub mod chain;
pub mod gif;
pub mod image_decoders;

use image::{ImageFormat, RgbaImage};

pub use self::chain::DecodeChain;
pub use self::gif::GifFallbackDecoder;
pub use self::image_decoders::{AnimatedGifDecoder, StaticImageDecoder};

/// Delay used for animation frames that declare none.
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// Upper bounds on decoded output. A limit of `0` is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted canvas width or height.
    pub max_dimension: u32,
    /// Pixel budget shared by every frame of one decode.
    pub max_pixels: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_dimension: 16_384,
            max_pixels: 100_000_000,
        }
    }
}

impl DecodeLimits {
    pub fn new(max_dimension: u32, max_pixels: u64) -> Self {
        Self {
            max_dimension,
            max_pixels,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, 0)
    }

    /// Reject a canvas that alone breaks either limit.
    pub fn check(&self, width: u32, height: u32) -> Result<(), DecodeError> {
        if self.max_dimension > 0 && (width > self.max_dimension || height > self.max_dimension) {
            return Err(DecodeError::TooLarge {
                width,
                height,
                reason: format!("maximum dimension is {}", self.max_dimension),
            });
        }
        if self.max_pixels > 0 && u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(DecodeError::TooLarge {
                width,
                height,
                reason: format!("pixel budget is {}", self.max_pixels),
            });
        }
        Ok(())
    }

    /// The same bounds expressed for the `image` crate's decoders.
    pub(crate) fn image_limits(&self) -> image::Limits {
        let mut limits = image::Limits::default();
        if self.max_dimension > 0 {
            limits.max_image_width = Some(self.max_dimension);
            limits.max_image_height = Some(self.max_dimension);
        }
        limits.max_alloc = (self.max_pixels > 0).then(|| self.max_pixels.saturating_mul(4));
        limits
    }

    pub(crate) fn budget(&self) -> PixelBudget {
        PixelBudget {
            remaining: (self.max_pixels > 0).then_some(self.max_pixels),
            limit: self.max_pixels,
        }
    }
}

/// Tracks pixels handed out across the frames of one decode.
#[derive(Debug)]
pub(crate) struct PixelBudget {
    remaining: Option<u64>,
    limit: u64,
}

impl PixelBudget {
    pub(crate) fn reserve(&mut self, width: u32, height: u32) -> Result<(), DecodeError> {
        let Some(remaining) = self.remaining.as_mut() else {
            return Ok(());
        };
        let pixels = u64::from(width) * u64::from(height);
        if pixels > *remaining {
            return Err(DecodeError::TooLarge {
                width,
                height,
                reason: format!("frames exceed the pixel budget of {}", self.limit),
            });
        }
        *remaining -= pixels;
        Ok(())
    }
}

/// One decoded frame, composited to the full canvas.
#[derive(Debug, Clone)]
pub struct Frame {
    pub buffer: RgbaImage,
    /// Display time in milliseconds. Irrelevant for single-frame images.
    pub delay_ms: u32,
}

impl Frame {
    pub fn new(buffer: RgbaImage, delay_ms: u32) -> Self {
        Self { buffer, delay_ms }
    }

    /// A frame of a static image.
    pub fn still(buffer: RgbaImage) -> Self {
        Self::new(buffer, 0)
    }
}

/// The result of a successful decode. Immutable once built.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub frames: Vec<Frame>,
    /// Name of the decoder that produced the frames.
    pub decoder: &'static str,
}

impl DecodedImage {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Canvas size of the first frame.
    pub fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|f| f.buffer.dimensions())
            .unwrap_or((0, 0))
    }

    pub fn delays(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.delay_ms).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// No decoder claims the payload's format (or the format is unknown).
    #[error("no decoder supports {format} payloads")]
    Unsupported { format: String },

    /// Every candidate claiming the format failed.
    #[error("all {attempts} decoder(s) failed for {format}")]
    Exhausted { format: String, attempts: usize },

    #[error("GIF decoding failed: {0}")]
    Gif(#[from] ::gif::DecodingError),

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("{width}x{height} image exceeds decode limits: {reason}")]
    TooLarge {
        width: u32,
        height: u32,
        reason: String,
    },

    /// A decoder reported success without producing any frame.
    #[error("decoder produced no frames")]
    Empty,
}

impl DecodeError {
    pub fn unsupported(format: Option<ImageFormat>) -> Self {
        Self::Unsupported {
            format: format_name(format),
        }
    }
}

pub(crate) fn format_name(format: Option<ImageFormat>) -> String {
    match format {
        Some(f) => format!("{f:?}").to_lowercase(),
        None => "unknown".to_string(),
    }
}

/// A general-purpose or format-specific image decoder.
pub trait FrameDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this decoder can parse `format`.
    fn supports(&self, format: ImageFormat) -> bool;

    /// Decode every frame within `limits`. Static formats yield exactly one
    /// frame.
    fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        limits: &DecodeLimits,
    ) -> Result<Vec<Frame>, DecodeError>;
}

/// Turns declared animation delays into playable ones: a zero delay repeats
/// the previous frame's delay, starting from [`DEFAULT_FRAME_DELAY_MS`].
#[derive(Debug)]
pub(crate) struct DelayNormalizer {
    last: u32,
}

impl DelayNormalizer {
    pub(crate) fn new() -> Self {
        Self {
            last: DEFAULT_FRAME_DELAY_MS,
        }
    }

    pub(crate) fn next(&mut self, declared_ms: u32) -> u32 {
        if declared_ms > 0 {
            self.last = declared_ms;
        }
        self.last
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    /// An animated GIF with one solid frame per `(rgb, delay_centis)` pair.
    pub fn gif(width: u16, height: u16, frames: &[([u8; 3], u16)]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = ::gif::Encoder::new(&mut out, width, height, &[]).unwrap();
            encoder.set_repeat(::gif::Repeat::Infinite).unwrap();
            for (rgb, delay) in frames {
                let pixels = vec![0u8; width as usize * height as usize];
                let mut frame =
                    ::gif::Frame::from_palette_pixels(width, height, pixels, rgb.to_vec(), None);
                frame.delay = *delay;
                encoder.write_frame(&frame).unwrap();
            }
        }
        out
    }

    /// A tiny GIF whose logical screen claims `width` x `height`, holding
    /// `frames` single-pixel frames.
    pub fn gif_on_screen(width: u16, height: u16, frames: usize) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = ::gif::Encoder::new(&mut out, width, height, &[]).unwrap();
            for _ in 0..frames {
                let frame = ::gif::Frame::from_palette_pixels(1, 1, vec![0u8], vec![255, 0, 0], None);
                encoder.write_frame(&frame).unwrap();
            }
        }
        out
    }
}
