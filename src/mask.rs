//! Mask edge softening.

use crate::config::MAX_BLUR_RADIUS;
use crate::segmentation::Mask;
use image::imageops;

/// Turns a provider mask into the alpha mask handed to the compositor.
///
/// Thresholding already happened in the provider; all that is left here is
/// softening the edges.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaskProcessor;

impl MaskProcessor {
    /// Gaussian-blur `raw` with a standard deviation of `blur_radius` pixels
    /// (clamped to 0-20). A radius of 0 returns the mask unchanged.
    ///
    /// Blurred coverage stays within [0, 1].
    pub fn process(&self, raw: &Mask, blur_radius: u32) -> Mask {
        let radius = blur_radius.min(MAX_BLUR_RADIUS);
        if radius == 0 {
            return raw.clone();
        }

        let _span = tracing::debug_span!("mask_blur", radius).entered();
        let mut blurred = imageops::blur(raw.as_image(), radius as f32);
        debug_assert_eq!(blurred.dimensions(), raw.dimensions());

        // kernel rounding can overshoot slightly
        for alpha in blurred.pixels_mut() {
            alpha.0[0] = alpha.0[0].clamp(0.0, 1.0);
        }

        Mask::from_image(blurred)
    }
}
