use std::path::Path;

use crate::error::UnitBusError;
use crate::transport::Transport;

use super::types::{BusConfig, DispatchConfig, UnitBusConfig};

impl UnitBusConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, UnitBusError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, UnitBusError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, UnitBusError> {
        let mut config = Self::local();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Single-host config using IPC sockets.
    pub fn local() -> Self {
        Self {
            bus: BusConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Config for a manager bridge reachable over TCP on two consecutive ports.
    pub fn remote(host: &str, signals_port: u16) -> Self {
        Self {
            bus: BusConfig {
                signals: format!("tcp://{host}:{signals_port}"),
                methods: format!("tcp://{host}:{}", signals_port + 1),
            },
            dispatch: DispatchConfig::default(),
        }
    }

    /// Resolve the signal endpoint.
    pub fn signals_transport(&self) -> Result<Transport, UnitBusError> {
        parse_endpoint("bus.signals", &self.bus.signals)
    }

    /// Resolve the method endpoint.
    pub fn methods_transport(&self) -> Result<Transport, UnitBusError> {
        parse_endpoint("bus.methods", &self.bus.methods)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `UNITBUS_SECTION_KEY` overrides `section.key`:
    /// - `UNITBUS_BUS_SIGNALS` -> `bus.signals`
    /// - `UNITBUS_BUS_METHODS` -> `bus.methods`
    /// - `UNITBUS_DISPATCH_SIGNAL_BUFFER` -> `dispatch.signal_buffer`
    /// - `UNITBUS_DISPATCH_LOOKUP_TIMEOUT_MS` -> `dispatch.lookup_timeout_ms`
    /// - `UNITBUS_DISPATCH_CALL_TIMEOUT_MS` -> `dispatch.call_timeout_ms`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("UNITBUS_BUS_SIGNALS") {
            self.bus.signals = v;
        }
        if let Ok(v) = std::env::var("UNITBUS_BUS_METHODS") {
            self.bus.methods = v;
        }
        if let Ok(v) = std::env::var("UNITBUS_DISPATCH_SIGNAL_BUFFER") {
            if let Ok(n) = v.parse() {
                self.dispatch.signal_buffer = n;
            }
        }
        if let Ok(v) = std::env::var("UNITBUS_DISPATCH_LOOKUP_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.dispatch.lookup_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("UNITBUS_DISPATCH_CALL_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.dispatch.call_timeout_ms = ms;
            }
        }
    }
}

pub(super) fn parse_endpoint(key: &str, endpoint: &str) -> Result<Transport, UnitBusError> {
    Transport::parse(endpoint).ok_or_else(|| {
        UnitBusError::Config(format!(
            "{key}: invalid endpoint '{endpoint}', expected ipc://<path> or tcp://<host>:<port>"
        ))
    })
}
