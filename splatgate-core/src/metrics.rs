use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Realtime counters about the units of work going through an endpoint.
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Default)]
pub struct InFlightStats {
    in_queue: AtomicU64,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`InFlightStats`], suitable for reporting.
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InFlightSnapshot {
    /// Units of work waiting for an execution slot
    pub in_queue: u64,

    /// Units of work currently running
    pub in_flight: u64,

    /// Units of work which produced an output
    pub completed: u64,

    /// Units of work which ended in an error
    pub failed: u64,
}

impl InFlightStats {
    pub fn snapshot(&self) -> InFlightSnapshot {
        InFlightSnapshot {
            in_queue: self.in_queue.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Register a new unit of work waiting for an execution slot.
    pub(crate) fn enqueue(self: &Arc<Self>) -> QueuedGuard {
        self.in_queue.fetch_add(1, Ordering::Relaxed);
        QueuedGuard {
            stats: Some(Arc::clone(self)),
        }
    }
}

/// Keeps a unit of work accounted as queued until it starts or is dropped.
pub(crate) struct QueuedGuard {
    stats: Option<Arc<InFlightStats>>,
}

impl QueuedGuard {
    pub(crate) fn start(mut self) -> RunningGuard {
        let stats = self.stats.take();
        if let Some(stats) = &stats {
            stats.in_queue.fetch_sub(1, Ordering::Relaxed);
            stats.in_flight.fetch_add(1, Ordering::Relaxed);
        }
        RunningGuard { stats }
    }
}

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        if let Some(stats) = self.stats.take() {
            stats.in_queue.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Keeps a unit of work accounted as running until it finishes.
/// Dropping it without calling [`RunningGuard::finish`] counts as a failure.
pub(crate) struct RunningGuard {
    stats: Option<Arc<InFlightStats>>,
}

impl RunningGuard {
    pub(crate) fn finish(mut self, success: bool) {
        if let Some(stats) = self.stats.take() {
            Self::record(&stats, success);
        }
    }

    fn record(stats: &InFlightStats, success: bool) {
        stats.in_flight.fetch_sub(1, Ordering::Relaxed);
        if success {
            stats.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if let Some(stats) = self.stats.take() {
            Self::record(&stats, false);
        }
    }
}
