//! Configuration for connecting to the unit manager bus.
//!
//! Parsed from `unitbus.toml`, with `UNITBUS_SECTION_KEY` environment
//! variables overriding individual keys.

mod loading;
mod types;
mod validation;


pub use types::{BusConfig, DispatchConfig, UnitBusConfig};
