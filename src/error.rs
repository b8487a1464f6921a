use thiserror::Error;

/// Failure to bring up the segmentation model. Fatal to segmentation for the
/// lifetime of the process: the pipeline stays in degraded mode.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(String),

    #[error("failed to build inference session: {0}")]
    Runtime(String),
}

/// Failure to list the attached video input devices.
#[derive(Error, Debug)]
#[error("failed to enumerate video devices: {0}")]
pub struct DeviceEnumerationError(pub String);

/// Failure to open a camera stream. Surfaced without retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
}

/// A single segmentation call failed.
#[derive(Error, Debug, Clone)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

/// Per-tick failures. None of these stop the scheduler.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("failed to read frame: {0}")]
    Capture(String),

    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Errors surfaced to the user from pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    DeviceEnumeration(#[from] DeviceEnumerationError),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("export unavailable: no active capture session")]
    ExportUnavailable,

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
