//! Maps a raw signal to the unit it concerns.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::UnitBusError;
use crate::names;
use crate::signal::{ObjectPath, Signal, SignalKind};
use crate::traits::UnitLookup;

/// Run a sub-lookup with an upper bound on its latency.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, UnitBusError>
where
    F: Future<Output = Result<T, UnitBusError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| UnitBusError::Timeout(timeout))?
}

/// Determine which unit object `signal` concerns, if any.
///
/// `PropertiesChanged` on the unit interface names its unit by origin path.
/// `JobRemoved` carries a unit name (third body element) that is translated
/// with one `GetUnit` call; when that call fails the unit has usually been
/// unloaded already and the signal is skipped. Every other signal yields
/// `None`.
pub async fn resolve_unit_path(
    signal: &Signal,
    lookup: &dyn UnitLookup,
    timeout: Duration,
) -> Option<ObjectPath> {
    match signal.kind() {
        SignalKind::PropertiesChanged => {
            (signal.str_at(0) == Some(names::UNIT_INTERFACE) && !signal.path.is_empty())
                .then(|| signal.path.clone())
        }
        SignalKind::JobRemoved => {
            let unit = signal.str_at(2)?;
            match bounded(timeout, lookup.get_unit(unit)).await {
                Ok(path) if !path.is_empty() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    debug!(unit, error = %e, "unit lookup failed, skipping update");
                    None
                }
            }
        }
        _ => None,
    }
}
