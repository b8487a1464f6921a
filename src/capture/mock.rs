//! Scriptable capture capabilities for tests.

use super::{DeviceDescriptor, DeviceEnumerator, DeviceId, Frame, FrameStream, MediaAcquisition};
use crate::error::{AcquireError, DeviceEnumerationError, FrameError};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters shared between a mock acquisition and the streams it hands out.
#[derive(Debug, Default, Clone)]
pub struct DeviceCounters {
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    pub ready: Arc<AtomicBool>,
}

impl DeviceCounters {
    pub fn new() -> Self {
        let counters = Self::default();
        counters.ready.store(true, Ordering::SeqCst);
        counters
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

/// Acquisition that yields solid-colour streams, or scripted failures.
pub struct MockAcquisition {
    pub width: u32,
    pub height: u32,
    pub counters: DeviceCounters,
    pub failures: Arc<Mutex<VecDeque<AcquireError>>>,
    /// When set, streams report these dimensions but deliver frames of this size
    pub frame_size_override: Option<(u32, u32)>,
}

impl MockAcquisition {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            counters: DeviceCounters::new(),
            failures: Arc::default(),
            frame_size_override: None,
        }
    }

    pub fn failing_with(self, err: AcquireError) -> Self {
        self.failures.lock().unwrap().push_back(err);
        self
    }
}

impl MediaAcquisition for MockAcquisition {
    type Stream = MockStream;

    fn acquire(
        &mut self,
        _device: &DeviceId,
        _desired_width: u32,
        _desired_height: u32,
    ) -> Result<MockStream, AcquireError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        let (fw, fh) = self.frame_size_override.unwrap_or((self.width, self.height));
        Ok(MockStream {
            width: self.width,
            height: self.height,
            frame_width: fw,
            frame_height: fh,
            sequence: 0,
            counters: self.counters.clone(),
        })
    }
}

pub struct MockStream {
    width: u32,
    height: u32,
    frame_width: u32,
    frame_height: u32,
    sequence: u64,
    counters: DeviceCounters,
}

impl FrameStream for MockStream {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn has_frame_data(&self) -> bool {
        self.counters.ready.load(Ordering::SeqCst)
    }

    fn read_frame(&mut self) -> Result<Frame, FrameError> {
        self.sequence += 1;
        Ok(Frame::new(
            test_image(self.frame_width, self.frame_height),
            self.sequence,
        ))
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deterministic gradient so composites can be compared pixel by pixel
pub fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Enumerator returning a fixed list, or an error.
pub struct MockDevices {
    pub result: Mutex<Result<Vec<DeviceDescriptor>, String>>,
}

impl MockDevices {
    pub fn with(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            result: Mutex::new(Ok(devices)),
        }
    }

    pub fn single() -> Self {
        Self::with(vec![DeviceDescriptor {
            id: DeviceId::from("0"),
            label: "Mock Camera".to_string(),
        }])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Mutex::new(Err(message.to_string())),
        }
    }
}

impl DeviceEnumerator for MockDevices {
    fn list_video_input_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceEnumerationError> {
        match &*self.result.lock().unwrap() {
            Ok(devices) => Ok(devices.clone()),
            Err(message) => Err(DeviceEnumerationError(message.clone())),
        }
    }
}
