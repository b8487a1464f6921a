use super::{DeviceDescriptor, DeviceEnumerator, DeviceId, Frame, FrameStream, MediaAcquisition};
use crate::error::{AcquireError, DeviceEnumerationError, FrameError};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::{Camera, NokhwaError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Device enumeration through nokhwa's native backend
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaDevices;

impl DeviceEnumerator for NokhwaDevices {
    fn list_video_input_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceEnumerationError> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| DeviceEnumerationError(e.to_string()))?;

        tracing::debug!("Enumerated {} video devices", cameras.len());

        Ok(cameras
            .iter()
            .map(|info| DeviceDescriptor {
                id: DeviceId(info.index().as_string()),
                label: info.human_name(),
            })
            .collect())
    }
}

/// Opens nokhwa camera streams
#[derive(Debug, Clone, Copy)]
pub struct NokhwaAcquisition {
    pub frame_rate: u32,
}

impl Default for NokhwaAcquisition {
    fn default() -> Self {
        Self { frame_rate: 30 }
    }
}

impl MediaAcquisition for NokhwaAcquisition {
    type Stream = NokhwaStream;

    /// Opens the camera on its own capture thread and waits for the stream
    /// to come up. Frames are read and decoded on that thread from then on.
    fn acquire(
        &mut self,
        device: &DeviceId,
        desired_width: u32,
        desired_height: u32,
    ) -> Result<NokhwaStream, AcquireError> {
        tracing::info!(
            "Opening webcam {} at {}x{}",
            device,
            desired_width,
            desired_height
        );

        let index = match device.0.parse::<u32>() {
            Ok(n) => CameraIndex::Index(n),
            Err(_) => CameraIndex::String(device.0.clone()),
        };
        let format = CameraFormat::new(
            Resolution::new(desired_width, desired_height),
            FrameFormat::MJPEG,
            self.frame_rate,
        );

        let slot = Arc::new(FrameSlot::default());
        let (opened_tx, opened_rx) = mpsc::sync_channel(1);
        let worker_slot = Arc::clone(&slot);
        let worker = thread::Builder::new()
            .name(format!("webcam-{device}"))
            .spawn(move || capture_loop(index, format, &worker_slot, opened_tx))
            .map_err(|e| AcquireError::DeviceUnavailable(format!("capture thread: {e}")))?;

        let opened = opened_rx.recv().unwrap_or_else(|_| {
            Err(AcquireError::DeviceUnavailable(
                "capture thread exited before opening the camera".to_string(),
            ))
        });
        let (width, height) = match opened {
            Ok(size) => size,
            Err(e) => {
                let _ = worker.join();
                return Err(e);
            }
        };
        tracing::info!("Webcam stream open at {}x{}", width, height);

        Ok(NokhwaStream {
            slot,
            worker: Some(worker),
            width,
            height,
            sequence: 0,
        })
    }
}

/// nokhwa reports every open failure as a string, so permission problems are
/// recognised by message.
fn classify(err: NokhwaError) -> AcquireError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        AcquireError::PermissionDenied(message)
    } else {
        AcquireError::DeviceUnavailable(message)
    }
}

/// Pause after a failed read so an unplugged camera does not spin the thread
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Owns the camera for the lifetime of the stream. Reports the opened size
/// through `opened`, then keeps the slot filled with the newest frame until
/// asked to stop.
fn capture_loop(
    index: CameraIndex,
    format: CameraFormat,
    slot: &FrameSlot,
    opened: mpsc::SyncSender<Result<(u32, u32), AcquireError>>,
) {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
    let mut camera = match Camera::new(index, requested).and_then(|mut camera| {
        camera.open_stream()?;
        Ok(camera)
    }) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(classify(e)));
            return;
        }
    };

    let resolution = camera.resolution();
    if opened
        .send(Ok((resolution.width(), resolution.height())))
        .is_err()
    {
        slot.stop();
    }

    while !slot.is_stopped() {
        let read = camera
            .frame()
            .map_err(|e| e.to_string())
            .and_then(|buffer| {
                buffer
                    .decode_image::<RgbFormat>()
                    .map_err(|e| format!("decode: {e}"))
            });
        let failed = read.is_err();
        slot.put(read);
        if failed {
            thread::sleep(READ_RETRY_DELAY);
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Failed to stop camera stream cleanly: {}", e);
    }
    tracing::info!("Webcam released");
}

/// Latest decoded frame (or read failure) handed from the capture thread to
/// the stream. Older, unread frames are overwritten.
#[derive(Debug, Default)]
struct FrameSlot {
    latest: Mutex<Option<Result<RgbImage, String>>>,
    stopped: AtomicBool,
}

impl FrameSlot {
    fn put(&self, frame: Result<RgbImage, String>) {
        *self.lock() = Some(frame);
    }

    fn take(&self) -> Option<Result<RgbImage, String>> {
        self.lock().take()
    }

    fn has_data(&self) -> bool {
        self.lock().is_some()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Result<RgbImage, String>>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An open webcam. Ready once the capture thread has buffered a frame;
/// reading never waits on the camera.
pub struct NokhwaStream {
    slot: Arc<FrameSlot>,
    worker: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
    sequence: u64,
}

impl FrameStream for NokhwaStream {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn has_frame_data(&self) -> bool {
        self.worker.is_some() && self.slot.has_data()
    }

    fn read_frame(&mut self) -> Result<Frame, FrameError> {
        match self.slot.take() {
            Some(Ok(image)) => {
                self.sequence += 1;
                Ok(Frame::new(image, self.sequence))
            }
            Some(Err(message)) => Err(FrameError::Capture(message)),
            None => Err(FrameError::Capture("no frame buffered".to_string())),
        }
    }

    fn release(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.slot.stop();
        if worker.join().is_err() {
            tracing::warn!("Capture thread panicked");
        }
        self.slot.take();
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.release();
    }
}
