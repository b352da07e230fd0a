//! Method calls to the manager bridge over ZeroMQ DEALER/ROUTER.
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! - DEALER sends: `[method, CallRequest]`
//! - ROUTER receives: `[identity, method, CallRequest]`
//! - ROUTER sends: `[identity, method, CallReply]`
//! - DEALER receives: `[method, CallReply]`
//!
//! Both payload frames are MessagePack. Replies are matched to callers by
//! `correlation_id`, so any number of calls may be in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::{DealerSocket, ZmqMessage};

use crate::error::UnitBusError;
use crate::names;
use crate::signal::{ObjectPath, Value};
use crate::traits::{ManagerControl, UnitLookup, UnitProperties};
use crate::transport::Transport;

/// Object path of the manager itself.
pub const MANAGER_PATH: &str = "/org/freedesktop/systemd1";

/// A method call on `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub correlation_id: Uuid,
    pub method: String,
    pub path: ObjectPath,
    #[serde(default)]
    pub args: Vec<Value>,
    pub sent_at: DateTime<Utc>,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, path: impl Into<ObjectPath>, args: Vec<Value>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            args,
            sent_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Answer to a [`CallRequest`]: the return values or an error name/message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReply {
    pub correlation_id: Uuid,
    pub result: Result<Vec<Value>, String>,
}

impl CallReply {
    pub fn ok(request: &CallRequest, values: Vec<Value>) -> Self {
        Self {
            correlation_id: request.correlation_id,
            result: Ok(values),
        }
    }

    pub fn err(request: &CallRequest, message: impl Into<String>) -> Self {
        Self {
            correlation_id: request.correlation_id,
            result: Err(message.into()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

type PendingMap = Mutex<HashMap<Uuid, oneshot::Sender<Result<Vec<Value>, String>>>>;
type Pending = Arc<PendingMap>;

/// DEALER-socket client for manager method calls.
///
/// The socket is owned by a background task that alternates between sending
/// queued requests and routing replies to their callers.
pub struct ZmqBusClient {
    send_tx: mpsc::Sender<ZmqMessage>,
    pending: Pending,
    timeout: Duration,
    loop_handle: tokio::task::JoinHandle<()>,
}

impl ZmqBusClient {
    /// Connect a DEALER socket to the bridge's ROUTER endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport, timeout: Duration) -> Result<Self, UnitBusError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting DEALER socket");
        socket.connect(&endpoint).await?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (send_tx, send_rx) = mpsc::channel::<ZmqMessage>(256);

        let loop_pending = Arc::clone(&pending);
        let loop_handle = tokio::spawn(async move {
            Self::event_loop(socket, send_rx, loop_pending).await;
        });

        Ok(Self {
            send_tx,
            pending,
            timeout,
            loop_handle,
        })
    }

    async fn event_loop(
        mut socket: DealerSocket,
        mut send_rx: mpsc::Receiver<ZmqMessage>,
        pending: Pending,
    ) {
        loop {
            tokio::select! {
                Some(zmq_msg) = send_rx.recv() => {
                    if let Err(e) = socket.send(zmq_msg).await {
                        warn!(error = %e, "DEALER send failed");
                    }
                }
                result = socket.recv() => {
                    match result {
                        Ok(zmq_msg) => Self::dispatch_reply(&pending, zmq_msg).await,
                        Err(e) => {
                            debug!(error = %e, "DEALER recv loop ending");
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    /// Route an inbound reply to the waiting caller.
    async fn dispatch_reply(pending: &PendingMap, zmq_msg: ZmqMessage) {
        let frames: Vec<_> = zmq_msg.iter().collect();
        let data_frames: Vec<_> = frames
            .iter()
            .skip_while(|f| f.as_ref().is_empty())
            .collect();

        let Some(payload) = data_frames.get(1) else {
            warn!(frame_count = frames.len(), "unexpected frame count on DEALER recv");
            return;
        };
        let reply = match CallReply::from_bytes(payload.as_ref()) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to decode call reply");
                return;
            }
        };

        let waiter = pending.lock().await.remove(&reply.correlation_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply.result);
            }
            None => debug!(correlation_id = %reply.correlation_id, "reply for unknown call"),
        }
    }

    /// Call `method` on `path` and wait for its return values.
    pub async fn call(
        &self,
        method: &str,
        path: impl Into<ObjectPath>,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, UnitBusError> {
        let request = CallRequest::new(method, path, args);
        let cid = request.correlation_id;
        let mut zmq_msg = ZmqMessage::from(method);
        zmq_msg.push_back(request.to_bytes()?.into());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(cid, tx);
        if self.send_tx.send(zmq_msg).await.is_err() {
            self.pending.lock().await.remove(&cid);
            return Err(UnitBusError::Transport("client event loop closed".into()));
        }
        debug!(correlation_id = %cid, method, "sent call");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result.map_err(UnitBusError::Lookup),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&cid);
                Err(UnitBusError::Transport("reply channel closed unexpectedly".into()))
            }
            Err(_) => {
                self.pending.lock().await.remove(&cid);
                Err(UnitBusError::Timeout(self.timeout))
            }
        }
    }

    async fn call_manager(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, UnitBusError> {
        self.call(method, MANAGER_PATH, args).await
    }
}

impl Drop for ZmqBusClient {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}

fn first_path(method: &str, values: Vec<Value>) -> Result<ObjectPath, UnitBusError> {
    match values.into_iter().next() {
        Some(Value::Path(p)) => Ok(p),
        _ => Err(UnitBusError::Lookup(format!("{method}: expected object path reply"))),
    }
}

fn first_string(method: &str, values: Vec<Value>) -> Result<String, UnitBusError> {
    match values.into_iter().next() {
        Some(Value::Str(s)) => Ok(s),
        _ => Err(UnitBusError::Lookup(format!("{method}: expected string reply"))),
    }
}

/// `GetAll` replies carry one `[name, value]` pair per property.
fn properties(values: Vec<Value>) -> UnitProperties {
    values
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Array(pair) => match <[Value; 2]>::try_from(pair) {
                Ok([Value::Str(name), value]) => Some((name, value)),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[async_trait]
impl UnitLookup for ZmqBusClient {
    async fn get_unit(&self, name: &str) -> Result<ObjectPath, UnitBusError> {
        let values = self.call_manager(names::GET_UNIT, vec![name.into()]).await?;
        first_path(names::GET_UNIT, values)
    }

    async fn get_unit_properties(
        &self,
        path: &ObjectPath,
    ) -> Result<UnitProperties, UnitBusError> {
        let values = self
            .call(names::GET_ALL_PROPERTIES, path.clone(), vec![names::UNIT_INTERFACE.into()])
            .await?;
        Ok(properties(values))
    }

    async fn get_unit_file_state(&self, name: &str) -> Result<String, UnitBusError> {
        let values = self
            .call_manager(names::GET_UNIT_FILE_STATE, vec![name.into()])
            .await?;
        first_string(names::GET_UNIT_FILE_STATE, values)
    }
}

#[async_trait]
impl ManagerControl for ZmqBusClient {
    async fn get_manager_property(&self, prop: &str) -> Result<String, UnitBusError> {
        let values = self
            .call_manager(
                names::GET_PROPERTY,
                vec![names::MANAGER_INTERFACE.into(), prop.into()],
            )
            .await?;
        values
            .first()
            .map(Value::to_string)
            .ok_or_else(|| UnitBusError::MissingProperty(prop.to_string()))
    }

    async fn call_job(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<ObjectPath, UnitBusError> {
        let values = self.call_manager(method, args).await?;
        first_path(method, values)
    }
}
