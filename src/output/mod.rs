mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbaImage;

/// Trait for destinations that present the render target
pub trait OutputSink {
    /// Present one composited frame
    fn present(&mut self, frame: &RgbaImage) -> Result<()>;
}
