use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageDecoder, ImageFormat, ImageReader};

use super::{DecodeError, DecodeLimits, DelayNormalizer, Frame, FrameDecoder};

/// Decodes every frame of an animated GIF through the `image` crate.
#[derive(Debug, Default)]
pub struct AnimatedGifDecoder;

impl FrameDecoder for AnimatedGifDecoder {
    fn name(&self) -> &'static str {
        "image-gif"
    }

    fn supports(&self, format: ImageFormat) -> bool {
        format == ImageFormat::Gif
    }

    fn decode(
        &self,
        bytes: &[u8],
        _format: ImageFormat,
        limits: &DecodeLimits,
    ) -> Result<Vec<Frame>, DecodeError> {
        let mut decoder = GifDecoder::new(Cursor::new(bytes))?;
        let (width, height) = decoder.dimensions();
        limits.check(width, height)?;
        decoder.set_limits(limits.image_limits())?;

        let mut budget = limits.budget();
        let mut delays = DelayNormalizer::new();

        decoder
            .into_frames()
            .map(|frame| {
                let frame = frame?;
                budget.reserve(width, height)?;
                let (numer, denom) = frame.delay().numer_denom_ms();
                let declared = if denom == 0 { 0 } else { numer / denom };
                Ok(Frame::new(frame.into_buffer(), delays.next(declared)))
            })
            .collect()
    }
}

/// Decodes the first frame of any format the `image` crate can read.
#[derive(Debug, Default)]
pub struct StaticImageDecoder;

impl FrameDecoder for StaticImageDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supports(&self, format: ImageFormat) -> bool {
        format.reading_enabled()
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        limits: &DecodeLimits,
    ) -> Result<Vec<Frame>, DecodeError> {
        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(limits.image_limits());
        let image = reader.decode()?;
        limits.check(image.width(), image.height())?;
        Ok(vec![Frame::still(image.to_rgba8())])
    }
}
