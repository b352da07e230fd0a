//! End-to-end tests for `Conn` over in-memory connections.
//!
//! The fake manager keeps a unit table and records every call, so tests can
//! check both what reaches the subscriber and which connection was used.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use unitbus::names;
use unitbus::{
    Conn, DispatchConfig, ManagerControl, ObjectPath, Signal, SignalConnection, SubStateUpdate,
    Subscriber, UnitBusError, UnitLookup, UnitProperties, Value,
};

const TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory stand-in for the manager, shared by both fake connections.
#[derive(Default)]
struct FakeManager {
    units: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    matches: Mutex<Vec<String>>,
    next_job: Mutex<u32>,
    /// When set, `get_unit_properties` parks until notified.
    gate: Option<Arc<Notify>>,
}

impl FakeManager {
    fn with_unit(self, name: &str, sub_state: &str) -> Self {
        self.units
            .lock()
            .unwrap()
            .insert(name.to_string(), sub_state.to_string());
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn unit_path(name: &str) -> ObjectPath {
        ObjectPath::new(format!("/org/freedesktop/systemd1/unit/{name}"))
    }
}

/// Method connection.
struct Methods(Arc<FakeManager>);

#[async_trait]
impl ManagerControl for Methods {
    async fn get_manager_property(&self, prop: &str) -> Result<String, UnitBusError> {
        self.0.record(format!("methods:Get:{prop}"));
        match prop {
            "Version" => Ok(Value::from("255").to_string()),
            _ => Err(UnitBusError::Lookup(format!("unknown property {prop}"))),
        }
    }

    async fn call_job(
        &self,
        method: &str,
        _args: Vec<Value>,
    ) -> Result<ObjectPath, UnitBusError> {
        self.0.record(format!("methods:{method}"));
        let mut next = self.0.next_job.lock().unwrap();
        *next += 1;
        Ok(ObjectPath::new(format!("/org/freedesktop/systemd1/job/{next}")))
    }
}

/// Signal connection.
struct Signals(Arc<FakeManager>);

#[async_trait]
impl UnitLookup for Signals {
    async fn get_unit(&self, name: &str) -> Result<ObjectPath, UnitBusError> {
        self.0.record(format!("signals:GetUnit:{name}"));
        if self.0.units.lock().unwrap().contains_key(name) {
            Ok(FakeManager::unit_path(name))
        } else {
            Err(UnitBusError::Lookup(format!("unit {name} not loaded")))
        }
    }

    async fn get_unit_properties(
        &self,
        path: &ObjectPath,
    ) -> Result<UnitProperties, UnitBusError> {
        self.0.record(format!("signals:GetAll:{path}"));
        if let Some(gate) = &self.0.gate {
            gate.notified().await;
        }
        let units = self.0.units.lock().unwrap().clone();
        let (name, sub) = units
            .iter()
            .find(|(name, _)| FakeManager::unit_path(name) == *path)
            .ok_or_else(|| UnitBusError::Lookup(format!("no unit at {path}")))?;
        Ok(UnitProperties::from([
            (names::PROP_ID.to_string(), Value::from(name.as_str())),
            (names::PROP_SUB_STATE.to_string(), Value::from(sub.as_str())),
        ]))
    }

    async fn get_unit_file_state(&self, name: &str) -> Result<String, UnitBusError> {
        self.0.record(format!("signals:GetUnitFileState:{name}"));
        Ok("enabled".into())
    }
}

#[async_trait]
impl SignalConnection for Signals {
    async fn add_match(&self, signal: &str) -> Result<(), UnitBusError> {
        self.0.matches.lock().unwrap().push(signal.to_string());
        Ok(())
    }

    async fn subscribe(&self) -> Result<(), UnitBusError> {
        self.0.record("signals:Subscribe");
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), UnitBusError> {
        self.0.record("signals:Unsubscribe");
        Ok(())
    }
}

async fn connect(manager: Arc<FakeManager>) -> (Conn, mpsc::Sender<Signal>) {
    let (tx, rx) = mpsc::channel(names::SIGNAL_BUFFER);
    let conn = Conn::start(
        Arc::new(Methods(manager.clone())),
        Arc::new(Signals(manager)),
        rx,
        &DispatchConfig::default(),
    )
    .await
    .unwrap();
    (conn, tx)
}

struct Channels {
    updates: mpsc::Receiver<SubStateUpdate>,
    errors: mpsc::Receiver<UnitBusError>,
    reloads: mpsc::Receiver<()>,
}

async fn subscriber(conn: &Conn, capacity: usize) -> Channels {
    let (utx, updates) = mpsc::channel(capacity);
    let (etx, errors) = mpsc::channel(1);
    let (rtx, reloads) = mpsc::channel(1);
    conn.set_sub_state_subscriber(utx, etx, rtx).await;
    Channels {
        updates,
        errors,
        reloads,
    }
}

fn job_removed(job: &str, unit: &str, result: &str) -> Signal {
    Signal::new(
        names::JOB_REMOVED,
        job,
        vec![
            Value::U32(1),
            Value::Path(job.into()),
            unit.into(),
            result.into(),
        ],
    )
}

fn props_changed(unit: &str) -> Signal {
    Signal::new(
        names::PROPERTIES_CHANGED,
        FakeManager::unit_path(unit),
        vec![names::UNIT_INTERFACE.into()],
    )
}

#[tokio::test]
async fn job_completion_and_state_update_end_to_end() {
    let manager = Arc::new(FakeManager::default().with_unit("unit.service", "running"));
    let (conn, tx) = connect(manager.clone()).await;
    let mut ch = subscriber(&conn, 8).await;

    let done = conn.watch_job(ObjectPath::new("/j/1")).await;
    tx.send(job_removed("/j/1", "unit.service", "done"))
        .await
        .unwrap();

    let result = timeout(TIMEOUT, done).await.expect("job timed out").unwrap();
    assert_eq!(result, "done");

    let update = timeout(TIMEOUT, ch.updates.recv())
        .await
        .expect("update timed out")
        .unwrap();
    assert_eq!(
        update,
        SubStateUpdate {
            unit_name: "unit.service".into(),
            sub_state: "running".into(),
            file_state: "enabled".into(),
        }
    );
    assert!(ch.errors.try_recv().is_err());

    // Lookups ran on the signal connection only.
    let calls = manager.calls();
    assert!(calls.contains(&"signals:GetUnit:unit.service".to_string()));
    assert!(calls.iter().all(|c| c.starts_with("signals:")));
}

#[tokio::test]
async fn job_match_registered_at_start() {
    let manager = Arc::new(FakeManager::default());
    let (_conn, _tx) = connect(manager.clone()).await;
    assert_eq!(*manager.matches.lock().unwrap(), vec![names::JOB_REMOVED]);
}

#[tokio::test]
async fn subscribe_adds_unit_matches() {
    let manager = Arc::new(FakeManager::default());
    let (conn, _tx) = connect(manager.clone()).await;
    conn.subscribe().await.unwrap();

    let matches = manager.matches.lock().unwrap().clone();
    for name in names::UNIT_MATCHES {
        assert!(matches.iter().any(|m| m == name), "missing match {name}");
    }
    assert!(manager.calls().contains(&"signals:Subscribe".to_string()));
}

#[tokio::test]
async fn unsubscribe_clears_subscriber() {
    let manager = Arc::new(FakeManager::default().with_unit("a.service", "running"));
    let (conn, tx) = connect(manager.clone()).await;
    let mut ch = subscriber(&conn, 8).await;

    conn.unsubscribe().await.unwrap();
    tx.send(props_changed("a.service")).await.unwrap();
    tx.send(Signal::new(names::UNIT_FILES_CHANGED, "/", vec![]))
        .await
        .unwrap();
    tx.send(Signal::new(names::RELOADING, "/", vec![false.into()]))
        .await
        .unwrap();

    // Let the loop drain the queue.
    let probe = conn.watch_job(ObjectPath::new("/j/probe")).await;
    tx.send(job_removed("/j/probe", "a.service", "done"))
        .await
        .unwrap();
    timeout(TIMEOUT, probe).await.unwrap().unwrap();

    assert!(ch.updates.try_recv().is_err());
    assert!(ch.reloads.try_recv().is_err());
    assert!(manager.calls().contains(&"signals:Unsubscribe".to_string()));
    assert_eq!(conn.metrics().reloads, 1);
}

#[tokio::test]
async fn reload_burst_reaches_subscriber_once() {
    let manager = Arc::new(FakeManager::default());
    let (conn, tx) = connect(manager).await;
    let mut ch = subscriber(&conn, 8).await;

    for sig in [
        Signal::new(names::UNIT_FILES_CHANGED, "/", vec![]),
        Signal::new(names::RELOADING, "/", vec![true.into()]),
        Signal::new(names::UNIT_FILES_CHANGED, "/", vec![]),
        Signal::new(names::RELOADING, "/", vec![false.into()]),
        Signal::new(names::RELOADING, "/", vec![true.into()]),
        Signal::new(names::RELOADING, "/", vec![false.into()]),
    ] {
        tx.send(sig).await.unwrap();
    }

    timeout(TIMEOUT, ch.reloads.recv())
        .await
        .expect("reload timed out")
        .unwrap();
    drop(tx);
    while conn.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(ch.reloads.try_recv().is_err());
}

#[tokio::test]
async fn start_job_then_wait() {
    let manager = Arc::new(FakeManager::default());
    let (conn, tx) = connect(manager).await;

    let (path, rx) = conn
        .start_job(
            "org.freedesktop.systemd1.Manager.StartUnit",
            vec!["a.service".into(), "replace".into()],
        )
        .await
        .unwrap();
    assert_eq!(path.as_str(), "/org/freedesktop/systemd1/job/1");

    tx.send(job_removed(path.as_str(), "a.service", "failed"))
        .await
        .unwrap();
    let result = conn.wait_job(&path, rx, TIMEOUT).await.unwrap();
    assert_eq!(result, "failed");
}

#[tokio::test]
async fn wait_job_timeout_forgets_registration() {
    let manager = Arc::new(FakeManager::default());
    let (conn, _tx) = connect(manager).await;
    let path = ObjectPath::new("/j/never");
    let rx = conn.watch_job(path.clone()).await;

    let err = conn
        .wait_job(&path, rx, Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, UnitBusError::Timeout(_)));
    assert!(!conn.forget_job(&path).await);
}

#[tokio::test]
async fn reconfigure_during_fetch_uses_old_channels() {
    let gate = Arc::new(Notify::new());
    let manager = Arc::new(FakeManager {
        gate: Some(gate.clone()),
        ..FakeManager::default()
    }
    .with_unit("slow.service", "activating"));
    let (conn, tx) = connect(manager.clone()).await;
    let mut old = subscriber(&conn, 8).await;

    tx.send(props_changed("slow.service")).await.unwrap();
    // Wait until the loop is parked inside the properties lookup.
    timeout(TIMEOUT, async {
        while !manager.calls().iter().any(|c| c.starts_with("signals:GetAll")) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("fetch never started");

    let mut new = subscriber(&conn, 8).await;
    gate.notify_one();

    let update = timeout(TIMEOUT, old.updates.recv())
        .await
        .expect("old subscriber got nothing")
        .unwrap();
    assert_eq!(update.unit_name, "slow.service");
    assert!(new.updates.try_recv().is_err());
}

#[tokio::test]
async fn partial_subscriber_without_error_channel() {
    let manager = Arc::new(FakeManager::default());
    let (conn, tx) = connect(manager).await;
    let (utx, mut urx) = mpsc::channel(1);
    conn.configure_subscriber(Subscriber {
        updates: Some(utx),
        ..Default::default()
    })
    .await;

    // Fetch fails and there is nowhere to report it.
    tx.send(props_changed("missing.service")).await.unwrap();
    let probe = conn.watch_job(ObjectPath::new("/j/p")).await;
    tx.send(job_removed("/j/p", "missing.service", "done"))
        .await
        .unwrap();
    timeout(TIMEOUT, probe).await.unwrap().unwrap();

    assert!(urx.try_recv().is_err());
    assert_eq!(conn.metrics().dropped, 1);
}

#[tokio::test]
async fn manager_property_uses_method_connection() {
    let manager = Arc::new(FakeManager::default());
    let (conn, _tx) = connect(manager.clone()).await;

    assert_eq!(conn.manager_property("Version").await.unwrap(), "\"255\"");
    assert!(conn.manager_property("Nope").await.is_err());
    assert!(manager
        .calls()
        .iter()
        .all(|c| c.starts_with("methods:")));
}

#[tokio::test]
async fn queue_close_stops_loop_quietly() {
    let manager = Arc::new(FakeManager::default());
    let (conn, tx) = connect(manager).await;
    assert!(conn.is_running());

    drop(tx);
    timeout(TIMEOUT, async {
        while conn.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatch loop kept running");
    conn.close().await;
}

#[tokio::test]
async fn stopped_resolves_when_queue_closes() {
    let manager = Arc::new(FakeManager::default());
    let (conn, tx) = connect(manager).await;

    // Still running: the future must not resolve yet.
    assert!(timeout(Duration::from_millis(50), conn.stopped()).await.is_err());

    drop(tx);
    timeout(TIMEOUT, conn.stopped())
        .await
        .expect("stopped never resolved");
    conn.close().await;
}
