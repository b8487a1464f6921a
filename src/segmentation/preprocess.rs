use super::types::AlphaImage;
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Converts frames into model input tensors and model output back to frame
/// resolution.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        tensor
    }

    /// Resize model-resolution probabilities to the frame's dimensions.
    ///
    /// Returns `None` if `probabilities` does not hold
    /// `model_width * model_height` values.
    pub fn postprocess(
        probabilities: Vec<f32>,
        model_width: u32,
        model_height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Vec<f32>> {
        let _span = tracing::debug_span!("postprocess").entered();

        let image = AlphaImage::from_raw(model_width, model_height, probabilities)?;
        if (model_width, model_height) == (frame_width, frame_height) {
            return Some(image.into_raw());
        }

        // Triangle keeps interpolated values inside the input range
        let resized = imageops::resize(
            &image,
            frame_width,
            frame_height,
            imageops::FilterType::Triangle,
        );

        Some(
            resized
                .into_raw()
                .into_iter()
                .map(|p| p.clamp(0.0, 1.0))
                .collect(),
        )
    }
}
