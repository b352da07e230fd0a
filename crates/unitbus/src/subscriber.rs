//! The single long-lived state subscriber and its delivery policy.
//!
//! Delivery never waits on the consumer. Each hand-off tries, in order:
//! 1. the primary channel (updates or reloads),
//! 2. the error channel, with a "channel full" notice or the fetch error,
//! 3. nothing: the event is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::UnitBusError;
use crate::names;
use crate::resolver::bounded;
use crate::signal::{ObjectPath, Value};
use crate::traits::{UnitLookup, UnitProperties};

/// Snapshot of one unit's state at the time it was fetched.
///
/// The snapshot may already reflect changes newer than the signal that
/// triggered it; treat a stream of these as a converging view, not a log
/// of transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubStateUpdate {
    pub unit_name: String,
    pub sub_state: String,
    pub file_state: String,
}

/// What happened to one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Landed on the primary channel.
    Delivered,
    /// Primary unavailable; a notice landed on the error channel.
    Reported,
    /// Nothing could take it.
    Dropped,
}

/// Channels of the active subscriber. Any of them may be absent.
///
/// A configuration is immutable once installed; reconfiguring swaps in a
/// whole new one.
#[derive(Debug, Clone, Default)]
pub struct Subscriber {
    pub updates: Option<mpsc::Sender<SubStateUpdate>>,
    pub errors: Option<mpsc::Sender<UnitBusError>>,
    pub reloads: Option<mpsc::Sender<()>>,
}

impl Subscriber {
    pub fn new(
        updates: mpsc::Sender<SubStateUpdate>,
        errors: mpsc::Sender<UnitBusError>,
        reloads: mpsc::Sender<()>,
    ) -> Self {
        Self {
            updates: Some(updates),
            errors: Some(errors),
            reloads: Some(reloads),
        }
    }

    /// Push `update`, falling back to a "channel full" error.
    pub fn deliver_update(&self, update: SubStateUpdate) -> Delivery {
        if let Some(tx) = &self.updates {
            if tx.try_send(update).is_ok() {
                return Delivery::Delivered;
            }
        }
        self.report_error(UnitBusError::ChannelFull)
    }

    /// Push `error` on the error channel, or drop it.
    pub fn report_error(&self, error: UnitBusError) -> Delivery {
        match &self.errors {
            Some(tx) => match tx.try_send(error) {
                Ok(()) => Delivery::Reported,
                Err(e) => {
                    trace!(error = %e.into_inner(), "error channel unavailable, dropping");
                    Delivery::Dropped
                }
            },
            None => Delivery::Dropped,
        }
    }

    /// Signal that a unit-file reload completed.
    pub fn notify_reload(&self) -> Delivery {
        match &self.reloads {
            Some(tx) if tx.try_send(()).is_ok() => Delivery::Delivered,
            _ => Delivery::Dropped,
        }
    }
}

/// Holder of the current [`Subscriber`], swapped as a whole under a lock.
///
/// Deliveries take a snapshot and release the lock before any lookup, so a
/// reconfiguration never waits on the bus and an in-flight delivery finishes
/// against the channel set it started with.
#[derive(Debug, Default)]
pub struct SubscriberSlot {
    current: Mutex<Option<Arc<Subscriber>>>,
}

impl SubscriberSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `subscriber`, replacing any previous one.
    pub async fn configure(&self, subscriber: Subscriber) {
        *self.current.lock().await = Some(Arc::new(subscriber));
        debug!("state subscriber configured");
    }

    /// Remove the active subscriber, reload channel included.
    pub async fn clear(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("state subscriber removed");
        }
    }

    /// The configuration in effect right now.
    pub async fn snapshot(&self) -> Option<Arc<Subscriber>> {
        self.current.lock().await.clone()
    }

    /// Whether a subscriber with an update channel is installed.
    pub async fn wants_updates(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.updates.is_some())
    }

    /// Fetch the state of the unit at `path` and hand it to the subscriber.
    pub async fn deliver_update(
        &self,
        path: &ObjectPath,
        lookup: &dyn UnitLookup,
        timeout: Duration,
    ) -> Delivery {
        let Some(subscriber) = self.snapshot().await else {
            return Delivery::Dropped;
        };
        match fetch_state(path, lookup, timeout).await {
            Ok(update) => {
                trace!(unit = %update.unit_name, sub_state = %update.sub_state, "delivering update");
                subscriber.deliver_update(update)
            }
            Err(e) => {
                debug!(%path, error = %e, "state fetch failed");
                subscriber.report_error(e)
            }
        }
    }

    /// Tell the subscriber a reload completed.
    pub async fn deliver_reload(&self) -> Delivery {
        match self.snapshot().await {
            Some(subscriber) => subscriber.notify_reload(),
            None => Delivery::Dropped,
        }
    }
}

/// Resolve the full [`SubStateUpdate`] for the unit object at `path`.
pub async fn fetch_state(
    path: &ObjectPath,
    lookup: &dyn UnitLookup,
    timeout: Duration,
) -> Result<SubStateUpdate, UnitBusError> {
    let props = bounded(timeout, lookup.get_unit_properties(path)).await?;
    let unit_name = string_prop(&props, names::PROP_ID)?;
    let sub_state = string_prop(&props, names::PROP_SUB_STATE)?;
    let file_state = bounded(timeout, lookup.get_unit_file_state(&unit_name)).await?;
    Ok(SubStateUpdate {
        unit_name,
        sub_state,
        file_state,
    })
}

fn string_prop(props: &UnitProperties, name: &str) -> Result<String, UnitBusError> {
    props
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UnitBusError::MissingProperty(name.to_string()))
}
