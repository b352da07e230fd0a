use std::fmt;

use serde::{Deserialize, Serialize};

use crate::names;

/// Opaque object path on the bus (e.g. `/org/freedesktop/systemd1/job/42`).
///
/// The empty path stands for "no object".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ObjectPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single typed value carried in a signal body or call reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    U32(u32),
    U64(u64),
    I64(i64),
    Str(String),
    Path(ObjectPath),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&ObjectPath> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }
}

/// Textual rendering close to the GVariant text format.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::U32(n) => write!(f, "uint32 {n}"),
            Self::U64(n) => write!(f, "uint64 {n}"),
            Self::I64(n) => write!(f, "int64 {n}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Path(p) => write!(f, "objectpath \"{p}\""),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// The signal families the dispatch loop knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    JobRemoved,
    PropertiesChanged,
    UnitFilesChanged,
    Reloading,
    Other,
}

/// An unsolicited notification emitted by the unit manager.
///
/// Signals travel the wire as MessagePack. The `name` doubles as the
/// subscription topic on the signal connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Fully qualified `<interface>.<member>`.
    pub name: String,

    /// Object that emitted the signal.
    pub path: ObjectPath,

    #[serde(default)]
    pub body: Vec<Value>,
}

impl Signal {
    pub fn new(name: impl Into<String>, path: impl Into<ObjectPath>, body: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            body,
        }
    }

    /// Classify by name.
    pub fn kind(&self) -> SignalKind {
        match self.name.as_str() {
            names::JOB_REMOVED => SignalKind::JobRemoved,
            names::PROPERTIES_CHANGED => SignalKind::PropertiesChanged,
            names::UNIT_FILES_CHANGED => SignalKind::UnitFilesChanged,
            names::RELOADING => SignalKind::Reloading,
            _ => SignalKind::Other,
        }
    }

    /// String body element at `index`, if present and a string.
    pub fn str_at(&self, index: usize) -> Option<&str> {
        self.body.get(index).and_then(Value::as_str)
    }

    /// Boolean body element at `index`, if present and a boolean.
    pub fn bool_at(&self, index: usize) -> Option<bool> {
        self.body.get(index).and_then(Value::as_bool)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}
