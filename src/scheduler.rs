//! The per-frame loop.
//!
//! Each refresh tick runs capture → segmentation → mask processing →
//! compositing strictly in sequence. A tick that is still waiting on
//! inference holds up the next one; refreshes that pass in the meantime are
//! dropped by the clock, never queued, so at most one frame and one mask are
//! in flight.

use crate::capture::{
    CaptureSession, DeviceEnumerator, DeviceSelector, FirstAvailable, Frame, MediaAcquisition,
};
use crate::clock::RefreshClock;
use crate::compositor::{composite, RenderTarget};
use crate::config::ParameterHandle;
use crate::control::{ControlCommand, StopHandle};
use crate::error::PipelineError;
use crate::mask::MaskProcessor;
use crate::output::OutputSink;
use crate::segmentation::{Mask, SegmentationProvider};
use crate::stats::PipelineStats;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Why a tick did no work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    StopRequested,
    NotActive,
    NoProvider,
    NotReady,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Guard failed; nothing was read
    Skipped(SkipReason),
    /// Masked frame written to the render target
    Composited,
    /// Segmentation unusable; raw frame written instead
    Passthrough,
    /// Frame could not be read or did not fit the render target
    Dropped,
    /// Stop arrived while inference was running; result thrown away
    Discarded,
}

/// Drives the capture session and the compositing pipeline.
pub struct FrameScheduler<A: MediaAcquisition, P: SegmentationProvider> {
    session: CaptureSession<A>,
    provider: Option<P>,
    devices: Box<dyn DeviceEnumerator>,
    selector: Box<dyn DeviceSelector>,
    processor: MaskProcessor,
    target: RenderTarget,
    params: ParameterHandle,
    stop: StopHandle,
    output: Option<Box<dyn OutputSink>>,
    export_dir: PathBuf,
    stats: PipelineStats,
}

impl<A: MediaAcquisition, P: SegmentationProvider> FrameScheduler<A, P> {
    /// `provider` is `None` when the model failed to load; the scheduler then
    /// runs degraded and refuses to start the camera.
    pub fn new(
        acquisition: A,
        provider: Option<P>,
        devices: Box<dyn DeviceEnumerator>,
        params: ParameterHandle,
        desired_width: u32,
        desired_height: u32,
    ) -> Self {
        Self {
            session: CaptureSession::new(acquisition, desired_width, desired_height),
            provider,
            devices,
            selector: Box::new(FirstAvailable),
            processor: MaskProcessor,
            target: RenderTarget::new(0, 0),
            params,
            stop: StopHandle::new(),
            output: None,
            export_dir: PathBuf::from("."),
            stats: PipelineStats::default(),
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn DeviceSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_output(mut self, output: Box<dyn OutputSink>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn parameters(&self) -> &ParameterHandle {
        &self.params
    }

    pub fn session(&self) -> &CaptureSession<A> {
        &self.session
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// True when no segmentation provider is available
    pub fn is_degraded(&self) -> bool {
        self.provider.is_none()
    }

    /// Select a device and start the capture session.
    ///
    /// Returns `Ok(true)` when the session became active. Without a provider
    /// or a device this is a no-op returning `Ok(false)`.
    pub fn enable(&mut self) -> Result<bool, PipelineError> {
        if self.provider.is_none() {
            tracing::warn!("Segmentation model unavailable, camera stays off");
            return Ok(false);
        }

        let devices = self.devices.list_video_input_devices()?;
        let device = self.selector.select(&devices).map(|d| {
            tracing::info!("Selected camera {} ({})", d.label, d.id);
            d.id.clone()
        });
        if device.is_none() {
            tracing::warn!("No video input device found");
        }

        match self.session.enable(device.as_ref(), self.provider.is_some())? {
            Some((width, height)) => {
                self.target.resize(width, height);
                self.stats = PipelineStats::default();
                self.stop.reset();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop the capture session, releasing the device.
    pub fn disable(&mut self) -> bool {
        let stopped = self.session.disable();
        if stopped {
            self.stats.log_summary();
        }
        stopped
    }

    fn guard(&self) -> Option<SkipReason> {
        if self.stop.is_stop_requested() {
            Some(SkipReason::StopRequested)
        } else if !self.session.is_active() {
            Some(SkipReason::NotActive)
        } else if self.provider.is_none() {
            Some(SkipReason::NoProvider)
        } else if !self.session.is_frame_ready() {
            Some(SkipReason::NotReady)
        } else {
            None
        }
    }

    /// Run one pass of the pipeline.
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = self.process_tick().await;
        self.stats.record(outcome);

        if matches!(outcome, TickOutcome::Composited | TickOutcome::Passthrough) {
            if let Some(output) = self.output.as_mut() {
                if let Err(e) = output.present(self.target.image()) {
                    tracing::warn!("Failed to present frame: {:#}", e);
                }
            }
        }

        outcome
    }

    async fn process_tick(&mut self) -> TickOutcome {
        if let Some(reason) = self.guard() {
            return TickOutcome::Skipped(reason);
        }

        // One snapshot for the whole tick
        let params = self.params.snapshot();

        let capture_start = Instant::now();
        let frame = match self.session.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping tick: {}", e);
                return TickOutcome::Dropped;
            }
        };
        self.stats.capture_time += capture_start.elapsed();

        let Some(provider) = self.provider.as_mut() else {
            return TickOutcome::Skipped(SkipReason::NoProvider);
        };

        let segment_start = Instant::now();
        let segmented = provider
            .segment(&frame, params.foreground_threshold)
            .await;
        self.stats.segment_time += segment_start.elapsed();

        if self.stop.is_stop_requested() || !self.session.is_active() {
            tracing::debug!("Discarding segmentation of frame {}", frame.sequence());
            return TickOutcome::Discarded;
        }

        let composite_start = Instant::now();
        let outcome = match segmented {
            Ok(mask) if is_degenerate(&mask) => {
                tracing::warn!("Segmentation returned an empty mask, passing frame through");
                self.passthrough(&frame)
            }
            Ok(raw) => {
                let alpha = self.processor.process(&raw, params.mask_blur_radius);
                match composite(&frame, &alpha, params.mask_opacity, &mut self.target) {
                    Ok(()) => TickOutcome::Composited,
                    Err(e) => {
                        tracing::warn!("Dropping tick: {}", e);
                        TickOutcome::Dropped
                    }
                }
            }
            Err(e) => {
                tracing::warn!("{}, passing frame through", e);
                self.passthrough(&frame)
            }
        };
        self.stats.composite_time += composite_start.elapsed();

        outcome
    }

    fn passthrough(&mut self, frame: &Frame) -> TickOutcome {
        match self.target.draw_frame(frame) {
            Ok(()) => TickOutcome::Passthrough,
            Err(e) => {
                tracing::warn!("Dropping tick: {}", e);
                TickOutcome::Dropped
            }
        }
    }

    /// Encode the render target as PNG. Only valid while capturing.
    pub fn export_png(&self) -> Result<Vec<u8>, PipelineError> {
        if !self.session.is_active() {
            return Err(PipelineError::ExportUnavailable);
        }
        self.target.encode_png()
    }

    /// Export to `path`, or to a timestamped file in the export directory.
    pub fn export_to_file(&self, path: Option<PathBuf>) -> Result<PathBuf, PipelineError> {
        let bytes = self.export_png()?;
        let path = path.unwrap_or_else(|| {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            self.export_dir.join(format!("seglive-{stamp}.png"))
        });
        std::fs::write(&path, bytes)?;
        tracing::info!("Exported render target to {}", path.display());
        Ok(path)
    }

    /// Apply a user command. Errors are reported, never propagated.
    pub fn apply(&mut self, command: ControlCommand) {
        tracing::debug!("Command: {:?}", command);
        match command {
            ControlCommand::Enable => match self.enable() {
                Ok(true) => {}
                Ok(false) => tracing::info!("Enable ignored"),
                Err(e) => tracing::error!("Failed to start camera: {}", e),
            },
            ControlCommand::Disable => {
                if !self.disable() {
                    tracing::info!("Disable ignored, session is {:?}", self.session.state());
                }
            }
            ControlCommand::SetThreshold(value) => self.params.set_threshold(value),
            ControlCommand::SetOpacity(value) => self.params.set_opacity(value),
            ControlCommand::SetBlurRadius(value) => self.params.set_blur_radius(value),
            ControlCommand::Export(path) => {
                if let Err(e) = self.export_to_file(path) {
                    tracing::error!("Export failed: {}", e);
                }
            }
            ControlCommand::Quit => self.stop.request_stop(),
        }
    }

    /// Tick on every refresh of `clock` and apply `commands` between ticks,
    /// until `Quit` arrives or the clock ends. A requested stop is honoured at
    /// the next tick boundary by stopping the session. The device is always
    /// released on return.
    pub async fn run<C: RefreshClock>(
        &mut self,
        clock: &mut C,
        commands: &mut mpsc::Receiver<ControlCommand>,
    ) {
        tracing::info!("Starting frame loop");
        let mut commands_open = true;

        loop {
            if self.stop.is_stop_requested() && self.session.is_active() {
                tracing::info!("Stop requested, halting capture");
                self.disable();
            }

            tokio::select! {
                biased;
                command = commands.recv(), if commands_open => match command {
                    Some(ControlCommand::Quit) => break,
                    Some(command) => self.apply(command),
                    None => commands_open = false,
                },
                more = clock.next_tick() => {
                    if !more {
                        tracing::info!("Refresh source ended");
                        break;
                    }
                    self.tick().await;
                }
            }
        }

        self.disable();
        tracing::info!("Frame loop finished");
    }
}

/// A mask with no pixels cannot be composited against any frame.
fn is_degenerate(mask: &Mask) -> bool {
    let (width, height) = mask.dimensions();
    width == 0 || height == 0
}
