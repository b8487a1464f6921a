//! Live person-segmentation overlay for camera feeds.
//!
//! A [`FrameScheduler`] owns the camera through a [`capture::CaptureSession`]
//! and, once per refresh tick, segments the current frame, softens the mask
//! and composites the frame through it into a [`RenderTarget`] that can be
//! presented or exported as PNG.

pub mod capture;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod control;
pub mod error;
pub mod mask;
pub mod output;
pub mod scheduler;
pub mod segmentation;
pub mod stats;

pub use compositor::{composite, RenderTarget};
pub use config::{CompositingParameters, ModelConfig, ParameterHandle};
pub use control::{ControlCommand, StopHandle};
pub use error::PipelineError;
pub use mask::MaskProcessor;
pub use scheduler::{FrameScheduler, SkipReason, TickOutcome};
