//! Last-resort GIF decoder.
//!
//! Reads frames straight from the `gif` crate with consistency checks off
//! and composites them onto the logical screen itself, honouring the
//! `Background` and `Previous` disposal methods. A stream that breaks after
//! at least one good frame yields the frames decoded so far. The logical
//! screen is checked against the decode limits before the canvas is
//! allocated, and every emitted frame draws from the pixel budget.

use std::io::Cursor;

use ::gif::{ColorOutput, DecodeOptions, DisposalMethod};
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::warn;

use super::{DecodeError, DecodeLimits, DelayNormalizer, Frame, FrameDecoder};

#[derive(Debug, Default)]
pub struct GifFallbackDecoder;

impl FrameDecoder for GifFallbackDecoder {
    fn name(&self) -> &'static str {
        "gif-fallback"
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
        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::RGBA);
        options.check_frame_consistency(false);
        options.allow_unknown_blocks(true);

        let mut decoder = options.read_info(Cursor::new(bytes))?;
        let width = u32::from(decoder.width()).max(1);
        let height = u32::from(decoder.height()).max(1);
        limits.check(width, height)?;

        let mut canvas = RgbaImage::new(width, height);
        let mut budget = limits.budget();
        let mut delays = DelayNormalizer::new();
        let mut frames = Vec::new();

        loop {
            let frame = match decoder.read_next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if frames.is_empty() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, decoded = frames.len(), "GIF stream truncated, keeping decoded frames");
                    break;
                }
            };

            let region = Region {
                left: u32::from(frame.left),
                top: u32::from(frame.top),
                width: u32::from(frame.width),
                height: u32::from(frame.height),
            };
            let restore = (frame.dispose == DisposalMethod::Previous).then(|| canvas.clone());

            budget.reserve(width, height)?;
            draw(&mut canvas, &region, &frame.buffer);
            frames.push(Frame::new(
                canvas.clone(),
                delays.next(u32::from(frame.delay) * 10),
            ));

            match frame.dispose {
                DisposalMethod::Background => clear(&mut canvas, &region),
                DisposalMethod::Previous => {
                    if let Some(previous) = restore {
                        canvas = previous;
                    }
                }
                DisposalMethod::Any | DisposalMethod::Keep => {}
            }
        }

        if frames.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(frames)
    }
}

struct Region {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Region {
    /// Canvas coordinates covered by the region, clipped to the canvas.
    fn pixels(&self, canvas: &RgbaImage) -> impl Iterator<Item = (u32, u32, usize)> + '_ {
        let (cw, ch) = canvas.dimensions();
        (0..self.height).flat_map(move |y| {
            (0..self.width).filter_map(move |x| {
                let (cx, cy) = (self.left + x, self.top + y);
                (cx < cw && cy < ch).then_some((cx, cy, ((y * self.width + x) * 4) as usize))
            })
        })
    }
}

/// Paint an RGBA frame buffer over the canvas; fully transparent pixels
/// leave the canvas untouched.
fn draw(canvas: &mut RgbaImage, region: &Region, rgba: &[u8]) {
    let targets: Vec<_> = region.pixels(canvas).collect();
    for (cx, cy, offset) in targets {
        let Some(px) = rgba.get(offset..offset + 4) else {
            continue;
        };
        if px[3] == 0 {
            continue;
        }
        canvas.put_pixel(cx, cy, Rgba([px[0], px[1], px[2], px[3]]));
    }
}

fn clear(canvas: &mut RgbaImage, region: &Region) {
    let targets: Vec<_> = region.pixels(canvas).collect();
    for (cx, cy, _) in targets {
        canvas.put_pixel(cx, cy, Rgba([0, 0, 0, 0]));
    }
}
