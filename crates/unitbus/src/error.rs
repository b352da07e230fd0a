use thiserror::Error;

/// Errors that can occur while talking to the unit manager over the bus.
#[derive(Debug, Error)]
pub enum UnitBusError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("bus call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("missing or mistyped property '{0}'")]
    MissingProperty(String),

    #[error("update channel full")]
    ChannelFull,

    #[error("job completion channel dropped before a result arrived")]
    JobAbandoned,

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
