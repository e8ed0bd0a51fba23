use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Backend API usage counters
#[derive(Debug, Default)]
pub struct BackendApiMetrics {
    pub start_requests: AtomicU64,
    pub status_polls: AtomicU64,
    pub errors: AtomicU64,
}

impl BackendApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&self) {
        self.start_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self) {
        self.status_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> BackendApiStats {
        BackendApiStats {
            start_requests: self.start_requests.load(Ordering::Relaxed),
            status_polls: self.status_polls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Backend API metrics: starts={}, polls={}, errors={}",
            stats.start_requests, stats.status_polls, stats.errors
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendApiStats {
    pub start_requests: u64,
    pub status_polls: u64,
    pub errors: u64,
}

/// Global metrics instance
static BACKEND_METRICS: std::sync::LazyLock<BackendApiMetrics> =
    std::sync::LazyLock::new(BackendApiMetrics::new);

pub fn backend_metrics() -> &'static BackendApiMetrics {
    &BACKEND_METRICS
}

/// Time a pipeline stage and log the elapsed time when it finishes
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
