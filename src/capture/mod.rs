mod nokhwa_capture;
mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use nokhwa_capture::{NokhwaAcquisition, NokhwaDevices, NokhwaStream};
pub use session::{CaptureSession, SessionState};

use crate::error::{AcquireError, DeviceEnumerationError, FrameError};
use image::RgbImage;
use std::fmt;
use std::sync::Arc;

/// Immutable snapshot of one camera frame.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Arc<RgbImage>,
    sequence: u64,
}

impl Frame {
    pub fn new(pixels: RgbImage, sequence: u64) -> Self {
        Self {
            pixels: Arc::new(pixels),
            sequence,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Monotonic counter assigned by the stream that produced this frame
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Backend-specific identifier of a video input device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A video input device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub label: String,
}

/// Lists the attached video input devices
pub trait DeviceEnumerator {
    fn list_video_input_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceEnumerationError>;
}

/// Opens camera streams
pub trait MediaAcquisition {
    type Stream: FrameStream;

    /// Open `device`, asking for frames as close to the desired size as the
    /// device allows. The stream reports what it actually delivers.
    fn acquire(
        &mut self,
        device: &DeviceId,
        desired_width: u32,
        desired_height: u32,
    ) -> Result<Self::Stream, AcquireError>;
}

/// An open camera stream. Exclusively owned by the capture session.
pub trait FrameStream {
    /// Dimensions of the frames this stream produces
    fn dimensions(&self) -> (u32, u32);

    /// Whether a frame can be read right now without stalling
    fn has_frame_data(&self) -> bool;

    /// Read the most recent frame
    fn read_frame(&mut self) -> Result<Frame, FrameError>;

    /// Release the underlying device
    fn release(&mut self);
}

/// Picks which device to open out of the enumerated list.
pub trait DeviceSelector {
    fn select<'a>(&self, devices: &'a [DeviceDescriptor]) -> Option<&'a DeviceDescriptor>;
}

/// Takes the first enumerated device. Enumeration order says nothing about
/// quality, so this is only a fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstAvailable;

impl DeviceSelector for FirstAvailable {
    fn select<'a>(&self, devices: &'a [DeviceDescriptor]) -> Option<&'a DeviceDescriptor> {
        devices.first()
    }
}

/// Picks the device with the given id, falling back to the first one.
#[derive(Debug, Clone)]
pub struct PreferredDevice(pub DeviceId);

impl DeviceSelector for PreferredDevice {
    fn select<'a>(&self, devices: &'a [DeviceDescriptor]) -> Option<&'a DeviceDescriptor> {
        devices
            .iter()
            .find(|d| d.id == self.0)
            .or_else(|| devices.first())
    }
}
