use anyhow::{Context, Result};
use clap::Parser;
use seglive::capture::{DeviceId, NokhwaAcquisition, NokhwaDevices, PreferredDevice};
use seglive::clock::IntervalClock;
use seglive::output::V4L2Output;
use seglive::segmentation::{self, OnnxSegmenter};
use seglive::control::forward_commands;
use seglive::{
    CompositingParameters, ControlCommand, FrameScheduler, ModelConfig, ParameterHandle,
    StopHandle,
};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long shutdown waits for an in-flight inference to finish
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device id (defaults to the first enumerated device)
    #[arg(short, long)]
    device: Option<String>,

    /// Requested capture width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Requested capture height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Display refresh rate driving the frame loop
    #[arg(long, default_value_t = 60)]
    refresh_rate: u32,

    /// Path to segmentation model (ONNX file)
    /// Without a usable model the camera cannot be started
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model input width
    #[arg(long, default_value_t = 256)]
    model_width: u32,

    /// Model input height
    #[arg(long, default_value_t = 256)]
    model_height: u32,

    /// Foreground probability threshold (0.0-1.0)
    #[arg(long, default_value_t = 0.7)]
    threshold: f32,

    /// Opacity of the video inside the mask (0.0-1.0)
    #[arg(long, default_value_t = 0.7)]
    opacity: f32,

    /// Mask edge blur radius in pixels (0-20)
    #[arg(long, default_value_t = 3)]
    blur_radius: u32,

    /// Present the render target on a v4l2loopback device
    #[arg(short, long)]
    output_device: Option<PathBuf>,

    /// Directory for `export` without an explicit path
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Single-threaded cooperative runtime; inference runs on the blocking pool
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let result = runtime.block_on(run(args));

    // The stdin thread is detached and never joined; only blocking-pool
    // work (inference) is waited for, and only briefly.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(args: Args) -> Result<()> {
    tracing::info!("seglive starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Refresh rate: {}Hz", args.refresh_rate);

    let provider = match &args.model {
        Some(path) => {
            let mut config = ModelConfig::new(path);
            config.input_width = args.model_width;
            config.input_height = args.model_height;
            match segmentation::load_provider(&config) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    tracing::error!("Segmentation disabled: {}", e);
                    None
                }
            }
        }
        None => {
            tracing::error!("Segmentation disabled: no model given (--model)");
            None
        }
    };

    let params = ParameterHandle::new(CompositingParameters::new(
        args.threshold,
        args.opacity,
        args.blur_radius,
    ));
    tracing::info!("Parameters: {:?}", params.snapshot());

    let stop = StopHandle::new();
    let mut scheduler: FrameScheduler<NokhwaAcquisition, OnnxSegmenter> = FrameScheduler::new(
        NokhwaAcquisition::default(),
        provider,
        Box::new(NokhwaDevices),
        params,
        args.capture_width,
        args.capture_height,
    )
    .with_export_dir(&args.export_dir)
    .with_stop_handle(stop.clone());

    if let Some(device) = &args.device {
        scheduler = scheduler.with_selector(Box::new(PreferredDevice(DeviceId(device.clone()))));
    }

    if let Some(path) = &args.output_device {
        let output = V4L2Output::new(path, args.capture_width, args.capture_height)
            .context("Failed to initialize v4l2loopback output")?;
        scheduler = scheduler.with_output(Box::new(output));
    }

    let (commands_tx, mut commands) = mpsc::channel(16);
    spawn_command_reader(commands_tx.clone())?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            stop.request_stop();
            let _ = commands_tx.send(ControlCommand::Quit).await;
        }
    });

    if let Err(e) = scheduler.enable() {
        tracing::error!("Failed to start camera: {}", e);
    }

    tracing::info!("Commands: enable | disable | threshold <v> | opacity <v> | blur <n> | export [path] | quit");

    let mut clock = IntervalClock::new(args.refresh_rate);
    scheduler.run(&mut clock, &mut commands).await;

    Ok(())
}

/// Forward stdin lines as commands on a dedicated thread until stdin closes.
fn spawn_command_reader(sender: mpsc::Sender<ControlCommand>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let forwarded = forward_commands(std::io::stdin().lock(), &sender);
            tracing::debug!("stdin closed after {} commands", forwarded);
        })
        .context("Failed to start command reader")?;
    Ok(())
}
