use crate::scheduler::TickOutcome;
use std::time::Duration;

/// How often (in processed ticks) a timing summary is logged
const LOG_INTERVAL: u64 = 30;

/// Running per-stage timings and tick outcome counts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineStats {
    /// Ticks that read a frame
    pub processed: u64,
    pub composited: u64,
    pub passthrough: u64,
    pub dropped: u64,
    pub discarded: u64,
    pub skipped: u64,
    pub capture_time: Duration,
    pub segment_time: Duration,
    pub composite_time: Duration,
}

impl PipelineStats {
    pub fn record(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Skipped(_) => {
                self.skipped += 1;
                return;
            }
            TickOutcome::Composited => self.composited += 1,
            TickOutcome::Passthrough => self.passthrough += 1,
            TickOutcome::Dropped => self.dropped += 1,
            TickOutcome::Discarded => self.discarded += 1,
        }
        self.processed += 1;

        if self.processed % LOG_INTERVAL == 0 {
            self.log_summary();
        }
    }

    pub fn log_summary(&self) {
        if self.processed == 0 {
            return;
        }
        let per_tick = |total: Duration| total.as_secs_f64() * 1000.0 / self.processed as f64;
        let capture_ms = per_tick(self.capture_time);
        let segment_ms = per_tick(self.segment_time);
        let composite_ms = per_tick(self.composite_time);
        let total_ms = capture_ms + segment_ms + composite_ms;
        let fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, total={:.1}ms, fps={:.1}",
            self.processed,
            capture_ms,
            segment_ms,
            composite_ms,
            total_ms,
            fps
        );
        tracing::info!(
            "Ticks: composited={}, passthrough={}, dropped={}, discarded={}, skipped={}",
            self.composited,
            self.passthrough,
            self.dropped,
            self.discarded,
            self.skipped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SkipReason;

    #[test]
    fn skipped_ticks_do_not_count_as_processed() {
        let mut stats = PipelineStats::default();
        stats.record(TickOutcome::Skipped(SkipReason::NotReady));
        stats.record(TickOutcome::Composited);
        stats.record(TickOutcome::Passthrough);
        stats.record(TickOutcome::Dropped);
        stats.record(TickOutcome::Discarded);

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 4);
        assert_eq!(
            (stats.composited, stats.passthrough, stats.dropped, stats.discarded),
            (1, 1, 1, 1)
        );
    }
}
