//! Pipeline counters shared by the producer, the processing thread and the controller.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated from the capture threads.
#[derive(Debug, Default)]
pub struct PipelineStats {
    captured: AtomicU64,
    published: AtomicU64,
    overwritten: AtomicU64,
    delivered: AtomicU64,
    filtered: AtomicU64,
    detector_failures: AtomicU64,
    source_errors: AtomicU64,
    sink_errors: AtomicU64,
    restarts: AtomicU64,
    stop_timeouts: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub published: u64,
    /// Frames dropped by the single-slot overwrite.
    pub overwritten: u64,
    pub delivered: u64,
    /// Frames the filter chain changed.
    pub filtered: u64,
    pub detector_failures: u64,
    pub source_errors: u64,
    pub sink_errors: u64,
    /// Restarts triggered by filter toggles and device switches.
    pub restarts: u64,
    /// Threads detached because they did not stop in time.
    pub stop_timeouts: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self, overwrote: bool) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if overwrote {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivered(&self, filtered: bool) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if filtered {
            self.filtered.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_detector_failure(&self) {
        self.detector_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stop_timeout(&self) {
        self.stop_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            stop_timeouts: self.stop_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captured={} published={} overwritten={} delivered={} filtered={} \
             detector_failures={} source_errors={} sink_errors={} restarts={} stop_timeouts={}",
            self.captured,
            self.published,
            self.overwritten,
            self.delivered,
            self.filtered,
            self.detector_failures,
            self.source_errors,
            self.sink_errors,
            self.restarts,
            self.stop_timeouts
        )
    }
}
