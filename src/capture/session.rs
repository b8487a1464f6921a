use super::{DeviceId, Frame, FrameStream, MediaAcquisition};
use crate::error::{AcquireError, FrameError};

/// Lifecycle of the camera device.
///
/// ```text
/// Idle       ──enable───▶ Requesting
/// Requesting ──ok───────▶ Active
/// Requesting ──fail─────▶ Error
/// Active     ──disable──▶ Stopped
/// Stopped    ──enable───▶ Requesting
/// Error      ──enable───▶ Requesting
/// Error      ──disable──▶ Idle
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Active,
    Stopped,
    Error(AcquireError),
}

/// Owns the camera stream exclusively. Releasing the stream through
/// [`CaptureSession::disable`] (or dropping the session) is the only way the
/// device is freed.
pub struct CaptureSession<A: MediaAcquisition> {
    acquisition: A,
    desired_width: u32,
    desired_height: u32,
    device_id: Option<DeviceId>,
    stream: Option<A::Stream>,
    state: SessionState,
    frame_dimensions: Option<(u32, u32)>,
}

impl<A: MediaAcquisition> CaptureSession<A> {
    pub fn new(acquisition: A, desired_width: u32, desired_height: u32) -> Self {
        Self {
            acquisition,
            desired_width,
            desired_height,
            device_id: None,
            stream: None,
            state: SessionState::Idle,
            frame_dimensions: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    /// Dimensions reported by the stream, known once `Active`
    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.frame_dimensions
    }

    /// Request the device and start streaming.
    ///
    /// Ignored (returns `Ok(None)`) unless the session is `Idle`, `Stopped` or
    /// `Error` and both a device and a segmentation provider are available.
    /// On success returns the stream's frame dimensions.
    pub fn enable(
        &mut self,
        device: Option<&DeviceId>,
        provider_loaded: bool,
    ) -> Result<Option<(u32, u32)>, AcquireError> {
        let device = match device {
            Some(device) if provider_loaded => device,
            _ => {
                tracing::debug!(
                    "Enable ignored: device={}, provider_loaded={}",
                    device.is_some(),
                    provider_loaded
                );
                return Ok(None);
            }
        };

        match self.state {
            SessionState::Idle | SessionState::Stopped | SessionState::Error(_) => {}
            SessionState::Requesting | SessionState::Active => {
                tracing::debug!("Enable ignored in state {:?}", self.state);
                return Ok(None);
            }
        }

        self.state = SessionState::Requesting;
        tracing::info!("Requesting camera {}", device);

        match self
            .acquisition
            .acquire(device, self.desired_width, self.desired_height)
        {
            Ok(stream) => {
                let dims = stream.dimensions();
                self.stream = Some(stream);
                self.device_id = Some(device.clone());
                self.frame_dimensions = Some(dims);
                self.state = SessionState::Active;
                tracing::info!("Capture session active at {}x{}", dims.0, dims.1);
                Ok(Some(dims))
            }
            Err(err) => {
                tracing::error!("Camera acquisition failed: {}", err);
                self.stream = None;
                self.frame_dimensions = None;
                self.state = SessionState::Error(err.clone());
                Err(err)
            }
        }
    }

    /// Stop streaming and release the device.
    ///
    /// The device is released before the state reads `Stopped`. Returns
    /// whether a transition happened; outside `Active` this is a no-op, except
    /// that an `Error` is acknowledged back to `Idle`.
    pub fn disable(&mut self) -> bool {
        match self.state {
            SessionState::Active => {
                if let Some(mut stream) = self.stream.take() {
                    stream.release();
                }
                self.frame_dimensions = None;
                self.state = SessionState::Stopped;
                tracing::info!("Capture session stopped");
                true
            }
            SessionState::Error(_) => {
                self.state = SessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Whether a frame can be read this tick
    pub fn is_frame_ready(&self) -> bool {
        self.is_active() && self.stream.as_ref().is_some_and(|s| s.has_frame_data())
    }

    pub fn read_frame(&mut self) -> Result<Frame, FrameError> {
        match self.stream.as_mut() {
            Some(stream) if self.state == SessionState::Active => stream.read_frame(),
            _ => Err(FrameError::Capture("no active stream".to_string())),
        }
    }
}

impl<A: MediaAcquisition> Drop for CaptureSession<A> {
    fn drop(&mut self) {
        self.disable();
    }
}
