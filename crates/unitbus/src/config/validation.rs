use super::loading::parse_endpoint;
use super::types::UnitBusConfig;
use crate::error::UnitBusError;

impl UnitBusConfig {
    /// Validate endpoints and dispatch limits.
    pub fn validate(&self) -> Result<(), UnitBusError> {
        parse_endpoint("bus.signals", &self.bus.signals)?;
        parse_endpoint("bus.methods", &self.bus.methods)?;
        self.validate_dispatch()
    }

    fn validate_dispatch(&self) -> Result<(), UnitBusError> {
        if self.dispatch.signal_buffer == 0 {
            return Err(UnitBusError::Config(
                "dispatch.signal_buffer must be greater than 0".into(),
            ));
        }
        if self.dispatch.lookup_timeout_ms == 0 {
            return Err(UnitBusError::Config(
                "dispatch.lookup_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.dispatch.call_timeout_ms == 0 {
            return Err(UnitBusError::Config(
                "dispatch.call_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
