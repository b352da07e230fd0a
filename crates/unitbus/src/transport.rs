use serde::{Deserialize, Serialize};

/// Where a bus socket lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket at the given filesystem path.
    Ipc(String),

    /// TCP, for reaching a manager bridge on another host.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// IPC transport for a named socket under `/tmp/unitbus/`.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(format!("/tmp/unitbus/{name}.sock"))
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint string like `ipc:///tmp/unitbus/signals.sock` or
    /// `tcp://host:port`.
    pub fn parse(endpoint: &str) -> Option<Self> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            (!path.is_empty()).then(|| Self::Ipc(path.to_string()))
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port) = addr.rsplit_once(':')?;
            Some(Self::tcp(host, port.parse().ok()?))
        } else {
            None
        }
    }

    /// ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{path}"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}
