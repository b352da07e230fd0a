//! Canonical bus names used for routing.
//!
//! Signal names are fully qualified as `<interface>.<member>`, which is also
//! the topic prefix the signal connection subscribes to.

// ── Interfaces ────────────────────────────────────────────────────────────

/// Manager interface of the unit manager.
pub const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Interface whose property changes carry per-unit state.
pub const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

// ── Signals ───────────────────────────────────────────────────────────────

/// A job finished. Body: `[u32 id, path job, str unit, str result]`.
pub const JOB_REMOVED: &str = "org.freedesktop.systemd1.Manager.JobRemoved";

/// Properties changed on some object. Body: `[str interface, ...]`.
pub const PROPERTIES_CHANGED: &str = "org.freedesktop.DBus.Properties.PropertiesChanged";

/// Unit definitions on disk changed. Empty body.
pub const UNIT_FILES_CHANGED: &str = "org.freedesktop.systemd1.Manager.UnitFilesChanged";

/// The manager started or finished a reload. Body: `[bool active]`.
pub const RELOADING: &str = "org.freedesktop.systemd1.Manager.Reloading";

// ── Manager methods ───────────────────────────────────────────────────────

pub const SUBSCRIBE: &str = "org.freedesktop.systemd1.Manager.Subscribe";
pub const UNSUBSCRIBE: &str = "org.freedesktop.systemd1.Manager.Unsubscribe";
pub const GET_UNIT: &str = "org.freedesktop.systemd1.Manager.GetUnit";
pub const GET_UNIT_FILE_STATE: &str = "org.freedesktop.systemd1.Manager.GetUnitFileState";

/// Fetch all properties of an interface on an object path.
pub const GET_ALL_PROPERTIES: &str = "org.freedesktop.DBus.Properties.GetAll";

/// Fetch a single property.
pub const GET_PROPERTY: &str = "org.freedesktop.DBus.Properties.Get";

// ── Properties ────────────────────────────────────────────────────────────

pub const PROP_ID: &str = "Id";
pub const PROP_SUB_STATE: &str = "SubState";

// ── Subscriptions ─────────────────────────────────────────────────────────

/// Match registered at connection setup so job completions always arrive.
pub const JOB_MATCHES: &[&str] = &[JOB_REMOVED];

/// Matches registered by `Conn::subscribe` before state updates can flow.
pub const UNIT_MATCHES: &[&str] = &[PROPERTIES_CHANGED, UNIT_FILES_CHANGED, RELOADING];

/// Default capacity of the bounded queue between transport and dispatch loop.
pub const SIGNAL_BUFFER: usize = 100;
