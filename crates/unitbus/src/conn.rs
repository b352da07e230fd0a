//! Connection façade tying the transport to the dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::{DispatchConfig, UnitBusConfig};
use crate::dispatch::Dispatcher;
use crate::error::UnitBusError;
use crate::jobs::{JobReceiver, JobRegistry};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::names;
use crate::pubsub::ZmqSignalConnection;
use crate::reqrep::ZmqBusClient;
use crate::signal::{ObjectPath, Signal, Value};
use crate::subscriber::{SubStateUpdate, Subscriber, SubscriberSlot};
use crate::traits::{ManagerControl, SignalConnection, UnitLookup};

/// A connection to the unit manager.
///
/// Two bus connections back it: one for general method calls and one that
/// receives signals and serves the dispatch loop's lookups. The dispatch
/// loop runs on its own task from [`Conn::start`] until the signal queue
/// closes or the connection is closed.
pub struct Conn {
    methods: Arc<dyn ManagerControl>,
    signals: Arc<dyn SignalConnection>,
    jobs: Arc<JobRegistry>,
    subscriber: Arc<SubscriberSlot>,
    metrics: Arc<DispatchMetrics>,
    dispatch: JoinHandle<()>,
    stopped: watch::Receiver<bool>,
}

impl Conn {
    /// Connect to a ZeroMQ manager bridge described by `config`.
    #[instrument(skip_all, fields(signals = %config.bus.signals, methods = %config.bus.methods))]
    pub async fn connect(config: &UnitBusConfig) -> Result<Self, UnitBusError> {
        config.validate()?;
        let signals_transport = config.signals_transport()?;
        let methods_transport = config.methods_transport()?;

        let methods =
            ZmqBusClient::connect(&methods_transport, config.dispatch.call_timeout()).await?;
        let (signals, signal_rx) = ZmqSignalConnection::connect(
            &signals_transport,
            &methods_transport,
            config.dispatch.signal_buffer,
            config.dispatch.lookup_timeout(),
        )
        .await?;

        Self::start(Arc::new(methods), Arc::new(signals), signal_rx, &config.dispatch).await
    }

    /// Register job completion matches and start the dispatch loop.
    ///
    /// `signal_rx` is the bounded queue the signal connection feeds.
    pub async fn start(
        methods: Arc<dyn ManagerControl>,
        signals: Arc<dyn SignalConnection>,
        signal_rx: mpsc::Receiver<Signal>,
        dispatch: &DispatchConfig,
    ) -> Result<Self, UnitBusError> {
        for name in names::JOB_MATCHES {
            signals.add_match(name).await?;
        }

        let jobs = Arc::new(JobRegistry::new());
        let subscriber = Arc::new(SubscriberSlot::new());
        let metrics = Arc::new(DispatchMetrics::new());
        let lookup: Arc<dyn UnitLookup> = Arc::new(signals.clone());

        let dispatcher = Dispatcher::new(
            jobs.clone(),
            subscriber.clone(),
            lookup,
            dispatch.lookup_timeout(),
        )
        .with_metrics(metrics.clone());
        let (stopped_tx, stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            dispatcher.run(signal_rx).await;
            let _ = stopped_tx.send(true);
        });

        Ok(Self {
            methods,
            signals,
            jobs,
            subscriber,
            metrics,
            dispatch: handle,
            stopped,
        })
    }

    /// Subscribe to all unit signals.
    ///
    /// Required before state updates can flow. The manager stops emitting
    /// when the connection goes away, so calling [`Conn::unsubscribe`] on
    /// teardown is optional.
    pub async fn subscribe(&self) -> Result<(), UnitBusError> {
        for name in names::UNIT_MATCHES {
            self.signals.add_match(name).await?;
        }
        self.signals.subscribe().await?;
        info!("subscribed to unit signals");
        Ok(())
    }

    /// Drop the state subscriber and stop unit signals.
    pub async fn unsubscribe(&self) -> Result<(), UnitBusError> {
        self.remove_sub_state_subscriber().await;
        self.signals.unsubscribe().await
    }

    /// Register interest in the job at `path`.
    ///
    /// Watching a path that is already watched replaces the earlier waiter.
    /// Prefer [`Conn::start_job`] when the job is started from here, since a
    /// completion can arrive before this call.
    pub async fn watch_job(&self, path: ObjectPath) -> JobReceiver {
        self.jobs.watch(path).await
    }

    /// Remove a job registration, e.g. after giving up on it.
    pub async fn forget_job(&self, path: &ObjectPath) -> bool {
        self.jobs.forget(path).await
    }

    /// Call a job-returning manager method and watch the job it creates.
    pub async fn start_job(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(ObjectPath, JobReceiver), UnitBusError> {
        let methods = &self.methods;
        self.jobs.track(|| methods.call_job(method, args)).await
    }

    /// Wait at most `timeout` for a job; the registration is dropped on timeout.
    pub async fn wait_job(
        &self,
        path: &ObjectPath,
        rx: JobReceiver,
        timeout: Duration,
    ) -> Result<String, UnitBusError> {
        self.jobs.wait(path, rx, timeout).await
    }

    /// Receive a [`SubStateUpdate`] whenever any unit's state changes.
    ///
    /// Updates are a converging view of current state, not a record of every
    /// transition, and are sent without blocking: when `updates` is full a
    /// "channel full" error goes to `errors`, and if that is full too the
    /// update is lost. `reloads` gets one event per completed unit-file reload.
    /// Replaces any previous subscriber.
    pub async fn set_sub_state_subscriber(
        &self,
        updates: mpsc::Sender<SubStateUpdate>,
        errors: mpsc::Sender<UnitBusError>,
        reloads: mpsc::Sender<()>,
    ) {
        self.configure_subscriber(Subscriber::new(updates, errors, reloads))
            .await;
    }

    /// Install a subscriber with any subset of channels.
    pub async fn configure_subscriber(&self, subscriber: Subscriber) {
        self.subscriber.configure(subscriber).await;
    }

    /// Remove the active subscriber, including its reload channel.
    pub async fn remove_sub_state_subscriber(&self) {
        self.subscriber.clear().await;
    }

    /// Value of a manager property in its textual form.
    pub async fn manager_property(&self, prop: &str) -> Result<String, UnitBusError> {
        self.methods.get_manager_property(prop).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether the dispatch loop is still consuming signals.
    pub fn is_running(&self) -> bool {
        !self.dispatch.is_finished()
    }

    /// Resolves once the dispatch loop has stopped.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        // An error means the task was aborted, which also counts as stopped.
        let _ = stopped.wait_for(|done| *done).await;
    }

    /// Stop the dispatch loop and drop both connections.
    pub async fn close(self) {
        self.dispatch.abort();
        info!(metrics = ?self.metrics.snapshot(), "connection closed");
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}
