//! Compositing parameters and model configuration.
//!
//! Parameters are written through a [`ParameterHandle`] shared with whatever
//! drives the UI and read by the scheduler as an immutable snapshot once per
//! tick, so a tick never sees a half-applied update.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Step applied to threshold and opacity writes.
pub const REAL_STEP: f32 = 0.05;

/// Largest supported mask blur radius, in pixels.
pub const MAX_BLUR_RADIUS: u32 = 20;

/// Snapshot of the user-tunable compositing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositingParameters {
    /// Minimum person probability for a pixel to count as foreground, 0.0-1.0
    pub foreground_threshold: f32,
    /// Opacity of the live frame in the render target, 0.0-1.0
    pub mask_opacity: f32,
    /// Mask edge softening radius in pixels, 0-20
    pub mask_blur_radius: u32,
}

impl CompositingParameters {
    /// Build a parameter set, clamping and quantising every field.
    pub fn new(foreground_threshold: f32, mask_opacity: f32, mask_blur_radius: u32) -> Self {
        Self {
            foreground_threshold: quantize_unit(foreground_threshold),
            mask_opacity: quantize_unit(mask_opacity),
            mask_blur_radius: mask_blur_radius.min(MAX_BLUR_RADIUS),
        }
    }
}

impl Default for CompositingParameters {
    fn default() -> Self {
        Self::new(0.7, 0.7, 3)
    }
}

/// Clamp to [0, 1] and snap to the nearest [`REAL_STEP`].
fn quantize_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    let steps = (value.clamp(0.0, 1.0) / REAL_STEP).round();
    (steps * REAL_STEP).clamp(0.0, 1.0)
}

/// Shared, live-adjustable parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterHandle {
    inner: Arc<RwLock<CompositingParameters>>,
}

impl ParameterHandle {
    pub fn new(initial: CompositingParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> CompositingParameters {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_threshold(&self, value: f32) {
        self.update(|p| p.foreground_threshold = quantize_unit(value));
    }

    pub fn set_opacity(&self, value: f32) {
        self.update(|p| p.mask_opacity = quantize_unit(value));
    }

    pub fn set_blur_radius(&self, value: u32) {
        self.update(|p| p.mask_blur_radius = value.min(MAX_BLUR_RADIUS));
    }

    fn update(&self, apply: impl FnOnce(&mut CompositingParameters)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
        tracing::debug!("Parameters updated: {:?}", *guard);
    }
}

/// Where and how to load the segmentation model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Path to the ONNX file
    pub path: PathBuf,
    /// Model input width in pixels
    pub input_width: u32,
    /// Model input height in pixels
    pub input_height: u32,
    /// Runtime intra-op thread count
    pub intra_threads: usize,
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            input_width: 256,
            input_height: 256,
            intra_threads: 4,
        }
    }
}
