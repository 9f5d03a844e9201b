//! Pipeline statistics: plain counters plus rolling-window latency
//! averages. The sum of the three latency averages is the reported
//! end-to-end estimate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// How many samples each rolling window keeps (about four seconds of
/// samples at 30 fps).
const ROLLING_WINDOW_LEN: usize = 120;

/// A point-in-time snapshot of the pipeline counters and averages.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_encoded: u64,
    pub chunks_produced: u64,
    pub queue_drops: u64,
    pub bitmaps_applied: u64,

    /// Rolling average time spent applying a bitmap to the surface.
    pub avg_bitmap_apply: Duration,
    /// Rolling average time spent writing a frame to encoder stdin.
    pub avg_stdin_write: Duration,
    /// Rolling average from the last stdin write to the next stdout data.
    pub avg_encoder_latency: Duration,
}

impl PipelineStats {
    /// The end-to-end latency estimate: apply + write + encode.
    pub fn estimated_end_to_end(&self) -> Duration {
        self.avg_bitmap_apply + self.avg_stdin_write + self.avg_encoder_latency
    }
}

#[derive(Debug, Default)]
struct RollingWindow {
    samples: VecDeque<Duration>,
}

impl RollingWindow {
    fn push(&mut self, sample: Duration) {
        if self.samples.len() == ROLLING_WINDOW_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }
}

#[derive(Debug, Default)]
struct Inner {
    frames_received: u64,
    frames_encoded: u64,
    chunks_produced: u64,
    queue_drops: u64,
    bitmaps_applied: u64,

    bitmap_apply: RollingWindow,
    stdin_write: RollingWindow,
    encoder_latency: RollingWindow,
}

/// Shared, thread-safe collector the pipeline tasks feed.
#[derive(Debug, Default)]
pub struct PipelineStatsCollector {
    inner: Mutex<Inner>,
}

impl PipelineStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_received(&self) {
        self.lock().frames_received += 1;
    }

    pub fn frame_encoded(&self, stdin_write: Duration) {
        let mut inner = self.lock();
        inner.frames_encoded += 1;
        inner.stdin_write.push(stdin_write);
    }

    pub fn chunk_produced(&self) {
        self.lock().chunks_produced += 1;
    }

    pub fn chunk_dropped(&self) {
        self.lock().queue_drops += 1;
    }

    pub fn bitmap_applied(&self, apply_time: Duration) {
        let mut inner = self.lock();
        inner.bitmaps_applied += 1;
        inner.bitmap_apply.push(apply_time);
    }

    pub fn set_bitmaps_applied(&self, count: u64) {
        self.lock().bitmaps_applied = count;
    }

    pub fn encoder_latency_sample(&self, latency: Duration) {
        self.lock().encoder_latency.push(latency);
    }

    pub fn snapshot(&self) -> PipelineStats {
        let inner = self.lock();

        PipelineStats {
            frames_received: inner.frames_received,
            frames_encoded: inner.frames_encoded,
            chunks_produced: inner.chunks_produced,
            queue_drops: inner.queue_drops,
            bitmaps_applied: inner.bitmaps_applied,
            avg_bitmap_apply: inner.bitmap_apply.average(),
            avg_stdin_write: inner.stdin_write.average(),
            avg_encoder_latency: inner.encoder_latency.average(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_window_averages_recent_samples() {
        let mut window = RollingWindow::default();
        assert_eq!(window.average(), Duration::ZERO);

        window.push(Duration::from_millis(10));
        window.push(Duration::from_millis(20));
        assert_eq!(window.average(), Duration::from_millis(15));

        // Old samples fall out once the window is full.
        for _ in 0..ROLLING_WINDOW_LEN {
            window.push(Duration::from_millis(30));
        }
        assert_eq!(window.average(), Duration::from_millis(30));
    }

    #[test]
    fn end_to_end_estimate_is_the_sum_of_the_three_averages() {
        let collector = PipelineStatsCollector::new();
        collector.bitmap_applied(Duration::from_millis(2));
        collector.frame_encoded(Duration::from_millis(3));
        collector.encoder_latency_sample(Duration::from_millis(5));

        let stats = collector.snapshot();
        assert_eq!(stats.estimated_end_to_end(), Duration::from_millis(10));
    }

    #[test]
    fn counters_accumulate() {
        let collector = PipelineStatsCollector::new();
        collector.frame_received();
        collector.frame_received();
        collector.chunk_produced();
        collector.chunk_dropped();

        let stats = collector.snapshot();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.chunks_produced, 1);
        assert_eq!(stats.queue_drops, 1);
    }
}
