//! Signal dispatch for a unit manager reachable over a message bus.
//!
//! This crate provides:
//! - [`Conn`], a connection that tracks job completions and keeps one
//!   subscriber informed of unit state
//! - the dispatch loop, reload coalescer, and job registry behind it
//! - a ZeroMQ transport ([`ZmqSignalConnection`], [`ZmqBusClient`])
//! - TOML configuration with environment overrides

pub mod config;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod names;
pub mod pubsub;
pub mod reload;
pub mod reqrep;
pub mod resolver;
pub mod signal;
pub mod subscriber;
pub mod traits;
pub mod transport;

pub use config::{BusConfig, DispatchConfig, UnitBusConfig};
pub use conn::Conn;
pub use dispatch::Dispatcher;
pub use error::UnitBusError;
pub use jobs::{JobReceiver, JobRegistry};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use pubsub::{ZmqSignalConnection, ZmqSignalFeed};
pub use reload::{ReloadCoalescer, ReloadPhase};
pub use reqrep::{CallReply, CallRequest, ZmqBusClient};
pub use signal::{ObjectPath, Signal, SignalKind, Value};
pub use subscriber::{Delivery, SubStateUpdate, Subscriber, SubscriberSlot};
pub use traits::{ManagerControl, SignalConnection, UnitLookup, UnitProperties};
pub use transport::Transport;
