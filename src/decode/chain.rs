//! The decode chain.
//!
//! Candidates are tried in priority order and the first success wins. A
//! candidate failing on a non-GIF format hands over to the next one. A
//! failure on a GIF means the general-purpose path is broken for this
//! stream, so the chain skips the remaining candidates and goes straight to
//! the dedicated GIF decoder, whose verdict is final.
//!
//! Header dimensions are checked against the chain's [`DecodeLimits`]
//! before any candidate runs, so an oversized payload fails without
//! allocating its canvas.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, ImageReader};
use tracing::{debug, warn};

use super::{
    format_name, AnimatedGifDecoder, DecodeError, DecodeLimits, DecodedImage, FrameDecoder,
    GifFallbackDecoder, StaticImageDecoder,
};

pub struct DecodeChain {
    candidates: Vec<Arc<dyn FrameDecoder>>,
    gif_fallback: Arc<dyn FrameDecoder>,
    limits: DecodeLimits,
}

impl DecodeChain {
    /// The built-in chain: animated GIF, then every static format.
    pub fn new() -> Self {
        Self::with_candidates(vec![
            Arc::new(AnimatedGifDecoder) as Arc<dyn FrameDecoder>,
            Arc::new(StaticImageDecoder),
        ])
    }

    pub fn with_candidates(candidates: Vec<Arc<dyn FrameDecoder>>) -> Self {
        Self {
            candidates,
            gif_fallback: Arc::new(GifFallbackDecoder),
            limits: DecodeLimits::default(),
        }
    }

    pub fn with_gif_fallback(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.gif_fallback = decoder;
        self
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Detect the container format and decode `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        let format = image::guess_format(bytes).map_err(|_| DecodeError::unsupported(None))?;
        self.decode_as(bytes, format)
    }

    /// Decode `bytes` as `format`, skipping detection.
    pub fn decode_as(&self, bytes: &[u8], format: ImageFormat) -> Result<DecodedImage, DecodeError> {
        let candidates: Vec<_> = self
            .candidates
            .iter()
            .filter(|c| c.supports(format))
            .collect();

        if candidates.is_empty() {
            return Err(DecodeError::unsupported(Some(format)));
        }

        // Undetectable headers are left to the candidates to reject.
        if let Ok((width, height)) =
            ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()
        {
            self.limits.check(width, height)?;
        }

        let mut attempts = 0;
        for candidate in &candidates {
            attempts += 1;
            match candidate.decode(bytes, format, &self.limits) {
                Ok(frames) if !frames.is_empty() => {
                    debug!(decoder = candidate.name(), frames = frames.len(), "Decoded image");
                    return Ok(DecodedImage {
                        format,
                        frames,
                        decoder: candidate.name(),
                    });
                }
                Ok(_) => {
                    warn!(decoder = candidate.name(), "Decoder produced no frames");
                }
                Err(e) => {
                    warn!(decoder = candidate.name(), format = %format_name(Some(format)), error = %e, "Decoder failed");
                }
            }

            if format == ImageFormat::Gif {
                break;
            }
        }

        if format == ImageFormat::Gif {
            debug!(decoder = self.gif_fallback.name(), "Escalating to dedicated GIF decoder");
            let frames = self.gif_fallback.decode(bytes, format, &self.limits)?;
            if frames.is_empty() {
                return Err(DecodeError::Empty);
            }
            return Ok(DecodedImage {
                format,
                frames,
                decoder: self.gif_fallback.name(),
            });
        }

        Err(DecodeError::Exhausted {
            format: format_name(Some(format)),
            attempts,
        })
    }
}

impl Default for DecodeChain {
    fn default() -> Self {
        Self::new()
    }
}
