use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::UnitBusError;
use crate::signal::{ObjectPath, Value};

/// Property name → value, as returned by a `GetAll` on the unit interface.
pub type UnitProperties = HashMap<String, Value>;

/// Short request/response lookups against the unit manager.
///
/// The dispatch loop awaits these inline, so every call stalls signal
/// processing until it returns. Implementations should answer on the
/// signal connection and keep round-trips short.
#[async_trait]
pub trait UnitLookup: Send + Sync {
    /// Translate a unit name (e.g. `sshd.service`) into its object path.
    async fn get_unit(&self, name: &str) -> Result<ObjectPath, UnitBusError>;

    /// All properties of the unit interface at `path`.
    async fn get_unit_properties(&self, path: &ObjectPath)
        -> Result<UnitProperties, UnitBusError>;

    /// Enablement state of a unit file (`enabled`, `disabled`, `static`, ...).
    async fn get_unit_file_state(&self, name: &str) -> Result<String, UnitBusError>;
}

/// Blanket implementation so `Arc<dyn UnitLookup>` can be used directly.
#[async_trait]
impl<T: UnitLookup + ?Sized> UnitLookup for Arc<T> {
    async fn get_unit(&self, name: &str) -> Result<ObjectPath, UnitBusError> {
        (**self).get_unit(name).await
    }

    async fn get_unit_properties(
        &self,
        path: &ObjectPath,
    ) -> Result<UnitProperties, UnitBusError> {
        (**self).get_unit_properties(path).await
    }

    async fn get_unit_file_state(&self, name: &str) -> Result<String, UnitBusError> {
        (**self).get_unit_file_state(name).await
    }
}

/// General manager calls issued on the method connection.
#[async_trait]
pub trait ManagerControl: Send + Sync {
    /// A manager property rendered as text.
    async fn get_manager_property(&self, prop: &str) -> Result<String, UnitBusError>;

    /// Invoke a job-returning manager method (e.g. `StartUnit`) and return the job path.
    async fn call_job(&self, method: &str, args: Vec<Value>)
        -> Result<ObjectPath, UnitBusError>;
}

#[async_trait]
impl<T: ManagerControl + ?Sized> ManagerControl for Arc<T> {
    async fn get_manager_property(&self, prop: &str) -> Result<String, UnitBusError> {
        (**self).get_manager_property(prop).await
    }

    async fn call_job(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<ObjectPath, UnitBusError> {
        (**self).call_job(method, args).await
    }
}

/// The connection that receives signals.
///
/// It also answers the dispatch loop's lookups, keeping that traffic off
/// the method connection.
#[async_trait]
pub trait SignalConnection: UnitLookup {
    /// Start receiving signals named `signal`.
    async fn add_match(&self, signal: &str) -> Result<(), UnitBusError>;

    /// Ask the manager to emit unit signals to this connection.
    async fn subscribe(&self) -> Result<(), UnitBusError>;

    /// Ask the manager to stop emitting unit signals.
    async fn unsubscribe(&self) -> Result<(), UnitBusError>;
}
