//! The signal dispatch loop.
//!
//! One task owns the receiving end of the bounded signal queue and routes
//! every signal, in arrival order, to:
//! - the [`JobRegistry`] (`JobRemoved` completions),
//! - the [`ReloadCoalescer`] (`UnitFilesChanged`, `Reloading`),
//! - the resolver and [`SubscriberSlot`] (`JobRemoved`, `PropertiesChanged`).
//!
//! Hand-offs to consumers never wait. The only suspension points are the
//! queue itself and the short sub-lookups issued while resolving a unit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::jobs::JobRegistry;
use crate::metrics::DispatchMetrics;
use crate::reload::{ReloadCoalescer, ReloadPhase};
use crate::resolver::resolve_unit_path;
use crate::signal::{Signal, SignalKind};
use crate::subscriber::SubscriberSlot;
use crate::traits::UnitLookup;

/// State owned by the dispatch loop plus handles to the shared registries.
pub struct Dispatcher {
    jobs: Arc<JobRegistry>,
    subscriber: Arc<SubscriberSlot>,
    lookup: Arc<dyn UnitLookup>,
    metrics: Arc<DispatchMetrics>,
    lookup_timeout: Duration,
    reload: ReloadCoalescer,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<JobRegistry>,
        subscriber: Arc<SubscriberSlot>,
        lookup: Arc<dyn UnitLookup>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            subscriber,
            lookup,
            metrics: Arc::new(DispatchMetrics::new()),
            lookup_timeout,
            reload: ReloadCoalescer::new(),
        }
    }

    /// Record into an externally owned metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn reload_phase(&self) -> ReloadPhase {
        self.reload.phase()
    }

    /// Consume signals until the queue closes.
    ///
    /// A closed queue is the normal shutdown path and is not an error.
    pub async fn run(mut self, mut signals: mpsc::Receiver<Signal>) {
        info!("dispatch loop started");
        while let Some(signal) = signals.recv().await {
            self.handle(signal).await;
        }
        info!(metrics = ?self.metrics.snapshot(), "signal queue closed, dispatch loop exiting");
    }

    /// Route a single signal.
    pub async fn handle(&mut self, signal: Signal) {
        self.metrics.record_signal();
        trace!(signal = %signal.name, path = %signal.path, "dispatching");

        match signal.kind() {
            SignalKind::JobRemoved => {
                // Completion and state derivation are independent; fall through.
                self.complete_job(&signal).await;
            }
            SignalKind::PropertiesChanged => {}
            SignalKind::UnitFilesChanged => {
                self.reload.files_changed();
                return;
            }
            SignalKind::Reloading => {
                if let Some(active) = signal.bool_at(0) {
                    if self.reload.reloading(active) {
                        debug!("unit files reloaded");
                        self.metrics.record_reload();
                        let outcome = self.subscriber.deliver_reload().await;
                        trace!(?outcome, "reload event");
                    }
                }
                return;
            }
            SignalKind::Other => return,
        }

        // Skip the name lookup entirely when nobody listens.
        if !self.subscriber.wants_updates().await {
            return;
        }
        let lookup = self.lookup.as_ref();
        let Some(path) = resolve_unit_path(&signal, lookup, self.lookup_timeout).await else {
            return;
        };
        let outcome = self
            .subscriber
            .deliver_update(&path, lookup, self.lookup_timeout)
            .await;
        self.metrics.record_delivery(outcome);
    }

    async fn complete_job(&self, signal: &Signal) {
        let result = signal.str_at(3).unwrap_or_default().to_string();
        if self.jobs.complete(&signal.path, result).await {
            debug!(job = %signal.path, "job completed");
            self.metrics.record_job_completed();
        }
    }
}
