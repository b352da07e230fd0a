//! Counters kept by the dispatch loop.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::subscriber::Delivery;

/// Running totals updated by the dispatch loop, readable from any thread.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    signals: AtomicU64,
    jobs_completed: AtomicU64,
    reloads: AtomicU64,
    delivered: AtomicU64,
    reported: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub signals: u64,
    pub jobs_completed: u64,
    pub reloads: u64,
    pub delivered: u64,
    pub reported: u64,
    pub dropped: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_signal(&self) {
        self.signals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self, outcome: Delivery) {
        let counter = match outcome {
            Delivery::Delivered => &self.delivered,
            Delivery::Reported => &self.reported,
            Delivery::Dropped => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            signals: self.signals.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            reported: self.reported.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliveries_are_bucketed_by_outcome() {
        let m = DispatchMetrics::new();
        m.record_signal();
        m.record_signal();
        m.record_delivery(Delivery::Delivered);
        m.record_delivery(Delivery::Dropped);
        m.record_delivery(Delivery::Dropped);

        let snap = m.snapshot();
        assert_eq!(snap.signals, 2);
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.reported, 0);
        assert_eq!(snap.dropped, 2);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let json = serde_json::to_value(DispatchMetrics::new().snapshot()).unwrap();
        assert_eq!(json["jobs_completed"], 0);
    }
}
