//! Render target and mask compositing.
//!
//! Compositing draws the frame at the requested opacity and then keeps only
//! what the mask covers. Masking after the opacity scaling keeps the two
//! controls independent: opacity sets how much video shows through, blur sets
//! how soft the edge is.

use crate::capture::Frame;
use crate::error::{FrameError, PipelineError};
use crate::segmentation::Mask;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// RGBA (non-premultiplied) pixel buffer the pipeline draws into.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pixels: RgbaImage,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, TRANSPARENT),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Reallocate to `width` x `height`, cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        tracing::debug!("Render target resized to {}x{}", width, height);
        self.pixels = RgbaImage::from_pixel(width, height, TRANSPARENT);
    }

    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Draw `frame` fully opaque, replacing the previous contents.
    pub fn draw_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        self.check(frame.dimensions())?;
        for (dst, src) in self.pixels.pixels_mut().zip(frame.image().pixels()) {
            *dst = Rgba([src[0], src[1], src[2], u8::MAX]);
        }
        Ok(())
    }

    /// Encode the current contents as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        let mut bytes = Cursor::new(Vec::new());
        self.pixels.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    fn check(&self, actual: (u32, u32)) -> Result<(), FrameError> {
        if actual != self.dimensions() {
            return Err(FrameError::DimensionMismatch {
                expected: self.dimensions(),
                actual,
            });
        }
        Ok(())
    }
}

/// Composite `frame` through `mask` into `target`.
///
/// 1. clear the target
/// 2. draw the frame with its alpha scaled by `opacity`
/// 3. keep destination only where the mask covers it, scaling alpha by the
///    mask value; fully uncovered pixels become transparent black
///
/// Frame, mask and target must share dimensions; on mismatch the target is
/// left cleared and the error returned. No blending state outlives the call.
pub fn composite(
    frame: &Frame,
    mask: &Mask,
    opacity: f32,
    target: &mut RenderTarget,
) -> Result<(), FrameError> {
    let _span = tracing::debug_span!("composite").entered();

    target.clear();
    target.check(frame.dimensions())?;
    if mask.dimensions() != frame.dimensions() {
        return Err(FrameError::DimensionMismatch {
            expected: frame.dimensions(),
            actual: mask.dimensions(),
        });
    }

    let frame_alpha = opacity.clamp(0.0, 1.0) * 255.0;

    for ((dst, src), &coverage) in target
        .pixels
        .pixels_mut()
        .zip(frame.image().pixels())
        .zip(mask.values())
    {
        let alpha = (frame_alpha * coverage.clamp(0.0, 1.0)).round() as u8;
        *dst = if alpha == 0 {
            TRANSPARENT
        } else {
            Rgba([src[0], src[1], src[2], alpha])
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::test_image;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(test_image(width, height), 1)
    }

    #[test]
    fn opaque_mask_at_full_opacity_equals_direct_draw() {
        let frame = frame(32, 24);
        let mask = Mask::filled(32, 24, 1.0);

        let mut composited = RenderTarget::new(32, 24);
        composite(&frame, &mask, 1.0, &mut composited).unwrap();

        let mut direct = RenderTarget::new(32, 24);
        direct.draw_frame(&frame).unwrap();

        assert_eq!(composited.image(), direct.image());
    }

    #[test]
    fn zero_opacity_is_fully_transparent() {
        let frame = frame(16, 16);
        for mask in [
            Mask::filled(16, 16, 1.0),
            Mask::filled(16, 16, 0.4),
            Mask::filled(16, 16, 0.0),
        ] {
            let mut target = RenderTarget::new(16, 16);
            composite(&frame, &mask, 0.0, &mut target).unwrap();
            assert!(target.image().pixels().all(|p| *p == TRANSPARENT));
        }
    }

    #[test]
    fn background_becomes_transparent() {
        let frame = frame(4, 1);
        let mask = Mask::from_alpha(4, 1, vec![1.0, 0.0, 0.5, 0.0]).unwrap();
        let mut target = RenderTarget::new(4, 1);
        composite(&frame, &mask, 1.0, &mut target).unwrap();

        let source = frame.image();
        assert_eq!(target.image().get_pixel(0, 0)[3], 255);
        assert_eq!(target.image().get_pixel(1, 0), &TRANSPARENT);
        assert_eq!(target.image().get_pixel(2, 0)[3], 128);
        assert_eq!(target.image().get_pixel(2, 0).0[..3], source.get_pixel(2, 0).0[..]);
        assert_eq!(target.image().get_pixel(3, 0), &TRANSPARENT);
    }

    #[test]
    fn opacity_and_mask_alpha_multiply() {
        let frame = frame(1, 1);
        let mask = Mask::filled(1, 1, 0.5);
        let mut target = RenderTarget::new(1, 1);
        composite(&frame, &mask, 0.5, &mut target).unwrap();
        // 255 * 0.5 * 0.5 = 63.75
        assert_eq!(target.image().get_pixel(0, 0)[3], 64);
    }

    #[test]
    fn mismatched_mask_is_rejected_and_target_cleared() {
        let frame = frame(8, 8);
        let mut target = RenderTarget::new(8, 8);
        target.draw_frame(&frame).unwrap();

        let err = composite(&frame, &Mask::filled(4, 4, 1.0), 1.0, &mut target).unwrap_err();
        assert!(matches!(
            err,
            FrameError::DimensionMismatch {
                expected: (8, 8),
                actual: (4, 4)
            }
        ));
        assert!(target.image().pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn mismatched_target_is_rejected() {
        let mut target = RenderTarget::new(10, 10);
        let result = composite(&frame(8, 8), &Mask::filled(8, 8, 1.0), 1.0, &mut target);
        assert!(matches!(result, Err(FrameError::DimensionMismatch { .. })));
    }

    #[test]
    fn resize_clears_and_changes_size() {
        let mut target = RenderTarget::new(2, 2);
        target.draw_frame(&frame(2, 2)).unwrap();
        target.resize(1280, 720);
        assert_eq!(target.dimensions(), (1280, 720));
        assert!(target.image().pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn png_export_round_trips_dimensions() {
        let mut target = RenderTarget::new(20, 10);
        target.draw_frame(&frame(20, 10)).unwrap();

        let bytes = target.encode_png().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(&decoded, target.image());
    }
}
