//! Pending job tracking.
//!
//! A job is an asynchronous manager operation identified by its object path.
//! Callers register interest and receive a one-shot channel; the dispatch
//! loop resolves it when the matching `JobRemoved` signal arrives.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::UnitBusError;
use crate::signal::ObjectPath;

/// Receives the job result string (`done`, `canceled`, `failed`, ...).
pub type JobReceiver = oneshot::Receiver<String>;

/// Map of job path → single-use completion handle.
///
/// There is no expiry: a job that never completes stays registered until its
/// owner calls [`JobRegistry::forget`] (or uses [`JobRegistry::wait`], which
/// does so on timeout).
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<ObjectPath, oneshot::Sender<String>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the job at `path`.
    ///
    /// Registering the same path twice replaces the earlier waiter, whose
    /// receiver then resolves with a closed-channel error.
    pub async fn watch(&self, path: ObjectPath) -> JobReceiver {
        let (tx, rx) = oneshot::channel();
        let mut jobs = self.jobs.lock().await;
        if jobs.insert(path.clone(), tx).is_some() {
            warn!(%path, "job already watched, replacing previous waiter");
        }
        rx
    }

    /// Start a job and register it in one critical section.
    ///
    /// The registry stays locked while `start` runs, so a completion that
    /// races the call's reply is held back until the waiter is in place.
    pub async fn track<F, Fut>(&self, start: F) -> Result<(ObjectPath, JobReceiver), UnitBusError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ObjectPath, UnitBusError>>,
    {
        let mut jobs = self.jobs.lock().await;
        let path = start().await?;
        let (tx, rx) = oneshot::channel();
        jobs.insert(path.clone(), tx);
        debug!(%path, "tracking job");
        Ok((path, rx))
    }

    /// Deliver `result` to the waiter for `path` and drop the registration.
    ///
    /// Returns `false` when nothing was waiting on that path.
    pub async fn complete(&self, path: &ObjectPath, result: String) -> bool {
        let waiter = self.jobs.lock().await.remove(path);
        match waiter {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!(%path, "job waiter went away before completion");
                }
                true
            }
            None => false,
        }
    }

    /// Remove a registration without resolving it.
    pub async fn forget(&self, path: &ObjectPath) -> bool {
        self.jobs.lock().await.remove(path).is_some()
    }

    /// Wait for a job result, giving up after `timeout`.
    ///
    /// On timeout the registration is removed so it does not linger, unless
    /// a newer waiter has replaced it in the meantime.
    pub async fn wait(
        &self,
        path: &ObjectPath,
        rx: JobReceiver,
        timeout: Duration,
    ) -> Result<String, UnitBusError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(UnitBusError::JobAbandoned),
            Err(_) => {
                self.forget_abandoned(path).await;
                Err(UnitBusError::Timeout(timeout))
            }
        }
    }

    /// Remove the registration for `path` only if its receiver is gone.
    async fn forget_abandoned(&self, path: &ObjectPath) -> bool {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(path).is_some_and(|tx| tx.is_closed()) {
            jobs.remove(path);
            return true;
        }
        false
    }

    pub async fn is_pending(&self, path: &ObjectPath) -> bool {
        self.jobs.lock().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}
