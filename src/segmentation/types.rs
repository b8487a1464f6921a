use crate::capture::Frame;
use crate::error::InferenceError;
use image::{ImageBuffer, Luma};

/// Single-channel f32 image used for mask storage and filtering
pub type AlphaImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel foreground coverage: 0.0 = background, 1.0 = foreground.
///
/// Dimensions match the frame the mask was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    alpha: AlphaImage,
}

impl Mask {
    /// Wrap row-major alpha values. Returns `None` if the length does not
    /// match `width * height`.
    pub fn from_alpha(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        AlphaImage::from_raw(width, height, values).map(|alpha| Self { alpha })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            alpha: AlphaImage::from_pixel(width, height, Luma([value])),
        }
    }

    /// Binarise person probabilities with `threshold`.
    pub fn from_probabilities(
        width: u32,
        height: u32,
        probabilities: &[f32],
        threshold: f32,
    ) -> Option<Self> {
        let values = probabilities
            .iter()
            .map(|&p| if is_foreground(p, threshold) { 1.0 } else { 0.0 })
            .collect();
        Self::from_alpha(width, height, values)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.alpha.dimensions()
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> f32 {
        self.alpha.get_pixel(x, y)[0]
    }

    pub fn values(&self) -> &[f32] {
        self.alpha.as_raw()
    }

    pub fn as_image(&self) -> &AlphaImage {
        &self.alpha
    }

    pub(crate) fn from_image(alpha: AlphaImage) -> Self {
        Self { alpha }
    }
}

/// Monotonic threshold rule: `t = 0` keeps everything, `t = 1` keeps nothing,
/// and raising `t` never adds foreground.
pub fn is_foreground(probability: f32, threshold: f32) -> bool {
    threshold <= 0.0 || (threshold < 1.0 && probability >= threshold)
}

/// Anything that can turn a frame into a foreground mask.
///
/// Implementations may be slow; the scheduler awaits them and does nothing
/// else for the tick in the meantime. Calls must not depend on earlier calls.
#[allow(async_fn_in_trait)]
pub trait SegmentationProvider {
    /// Segment `frame`, marking pixels whose person probability reaches
    /// `threshold` as foreground. The mask has the frame's dimensions.
    async fn segment(&mut self, frame: &Frame, threshold: f32) -> Result<Mask, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_extremes() {
        for p in [0.0, 0.3, 0.99, 1.0] {
            assert!(is_foreground(p, 0.0));
            assert!(!is_foreground(p, 1.0));
        }
    }

    #[test]
    fn threshold_is_monotonic() {
        let probabilities = [0.0, 0.1, 0.45, 0.5, 0.8, 1.0];
        let mut previous = usize::MAX;
        for step in 0..=20 {
            let t = step as f32 * 0.05;
            let kept = probabilities.iter().filter(|&&p| is_foreground(p, t)).count();
            assert!(kept <= previous, "threshold {t} added foreground");
            previous = kept;
        }
    }

    #[test]
    fn from_probabilities_binarises() {
        let mask = Mask::from_probabilities(2, 2, &[0.2, 0.6, 0.8, 0.4], 0.5).unwrap();
        assert_eq!(mask.values(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn from_alpha_rejects_wrong_length() {
        assert!(Mask::from_alpha(3, 3, vec![0.0; 8]).is_none());
    }
}
