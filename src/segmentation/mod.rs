mod onnx;
mod preprocess;
pub mod types;

pub use onnx::OnnxSegmenter;
pub use preprocess::Preprocessor;
pub use types::{is_foreground, AlphaImage, Mask, SegmentationProvider};

use crate::config::ModelConfig;
use crate::error::ModelLoadError;

/// Load the default segmentation provider (ONNX Runtime)
pub fn load_provider(config: &ModelConfig) -> Result<OnnxSegmenter, ModelLoadError> {
    OnnxSegmenter::load(config)
}
