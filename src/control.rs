//! Commands accepted while the pipeline runs, and cooperative stop.

use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A user command applied between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Enable,
    Disable,
    SetThreshold(f32),
    SetOpacity(f32),
    SetBlurRadius(u32),
    /// Export the render target as PNG, to the given path or a generated one
    Export(Option<PathBuf>),
    Quit,
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| "empty command".to_string())?;
        let argument = words.next();

        let real = |name: &str| -> Result<f32, String> {
            argument
                .ok_or_else(|| format!("{name} needs a value"))?
                .parse::<f32>()
                .map_err(|e| format!("invalid {name}: {e}"))
        };

        match command.to_ascii_lowercase().as_str() {
            "enable" | "start" => Ok(Self::Enable),
            "disable" | "stop" => Ok(Self::Disable),
            "threshold" => real("threshold").map(Self::SetThreshold),
            "opacity" => real("opacity").map(Self::SetOpacity),
            "blur" => argument
                .ok_or_else(|| "blur needs a value".to_string())?
                .parse::<u32>()
                .map(Self::SetBlurRadius)
                .map_err(|e| format!("invalid blur radius: {e}")),
            "export" => Ok(Self::Export(argument.map(PathBuf::from))),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

/// Forward command lines from `reader` until it closes or the receiver goes
/// away. Returns the number of commands forwarded.
///
/// Blocks the calling thread. Run it on a dedicated thread, never on the
/// runtime's blocking pool, which waits for pending reads on shutdown.
pub fn forward_commands<R: BufRead>(reader: R, sender: &mpsc::Sender<ControlCommand>) -> usize {
    let mut forwarded = 0;
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read command: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ControlCommand>() {
            Ok(command) => {
                if sender.blocking_send(command).is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
    forwarded
}

/// Cooperative cancellation flag shared with the scheduler.
///
/// Requesting a stop never interrupts a tick; the scheduler honours it at the
/// next tick boundary and discards the result of any inference in flight.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}
