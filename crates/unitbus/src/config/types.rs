use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::names::SIGNAL_BUFFER;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for a [`Conn`](crate::Conn).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitBusConfig {
    /// Endpoints of the manager bridge.
    #[serde(default)]
    pub bus: BusConfig,

    /// Dispatch loop tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

// ── Section configs ─────────────────────────────────────────────────

/// Bus section: where signals come from and where calls go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Endpoint the manager publishes signals on (PUB socket).
    #[serde(default = "default_signals")]
    pub signals: String,

    /// Endpoint answering method calls (ROUTER socket).
    #[serde(default = "default_methods")]
    pub methods: String,
}

fn default_signals() -> String {
    "ipc:///tmp/unitbus/signals.sock".into()
}

fn default_methods() -> String {
    "ipc:///tmp/unitbus/methods.sock".into()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            signals: default_signals(),
            methods: default_methods(),
        }
    }
}

/// Dispatch section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the queue between the signal socket and the dispatch loop.
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,

    /// Upper bound on each lookup the dispatch loop makes while resolving a unit.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Upper bound on general method calls.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_signal_buffer() -> usize {
    SIGNAL_BUFFER
}

fn default_lookup_timeout_ms() -> u64 {
    2_000
}

fn default_call_timeout_ms() -> u64 {
    25_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            signal_buffer: default_signal_buffer(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
