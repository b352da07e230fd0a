//! Signal reception over a ZeroMQ SUB socket.
//!
//! The bridge publishes every manager signal as a two-frame message:
//! 1. Signal name (used by SUB sockets for prefix filtering)
//! 2. MessagePack-encoded [`Signal`]
//!
//! A match rule is a SUB subscription on the signal name.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, trace, warn};
use zeromq::prelude::*;
use zeromq::{SubSocket, ZmqMessage};

use crate::error::UnitBusError;
use crate::names;
use crate::reqrep::ZmqBusClient;
use crate::signal::{ObjectPath, Signal};
use crate::traits::{SignalConnection, UnitLookup, UnitProperties};
use crate::transport::Transport;

type MatchCommand = (String, oneshot::Sender<Result<(), UnitBusError>>);

/// SUB socket pumping decoded signals into a bounded queue.
///
/// The pump stops, closing the queue, when the socket fails or the queue's
/// receiver is dropped.
pub struct ZmqSignalFeed {
    match_tx: mpsc::Sender<MatchCommand>,
    pump: tokio::task::JoinHandle<()>,
}

impl ZmqSignalFeed {
    /// Connect to the bridge's PUB endpoint.
    ///
    /// Returns the feed and the receiving end of a queue holding up to
    /// `capacity` undispatched signals.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(
        transport: &Transport,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<Signal>), UnitBusError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting SUB socket");
        socket.connect(&endpoint).await?;

        let (signal_tx, signal_rx) = mpsc::channel(capacity);
        let (match_tx, match_rx) = mpsc::channel(16);
        let pump = tokio::spawn(Self::pump(socket, match_rx, signal_tx));

        Ok((Self { match_tx, pump }, signal_rx))
    }

    /// Subscribe to signals named `name`.
    pub async fn add_match(&self, name: &str) -> Result<(), UnitBusError> {
        let (tx, rx) = oneshot::channel();
        self.match_tx
            .send((name.to_string(), tx))
            .await
            .map_err(|_| UnitBusError::Transport("signal pump stopped".into()))?;
        rx.await
            .map_err(|_| UnitBusError::Transport("signal pump stopped".into()))?
    }

    async fn pump(
        mut socket: SubSocket,
        mut match_rx: mpsc::Receiver<MatchCommand>,
        signal_tx: mpsc::Sender<Signal>,
    ) {
        loop {
            tokio::select! {
                Some((name, reply)) = match_rx.recv() => {
                    let result = socket.subscribe(&name).await.map_err(UnitBusError::from);
                    if result.is_ok() {
                        debug!(signal = %name, "match added");
                    }
                    let _ = reply.send(result);
                }
                result = socket.recv() => {
                    let zmq_msg = match result {
                        Ok(m) => m,
                        Err(e) => {
                            info!(error = %e, "signal socket closed");
                            break;
                        }
                    };
                    let Some(signal) = decode(zmq_msg) else {
                        continue;
                    };
                    trace!(signal = %signal.name, "received signal");
                    if signal_tx.send(signal).await.is_err() {
                        debug!("signal queue receiver dropped, stopping pump");
                        break;
                    }
                }
                else => break,
            }
        }
    }
}

impl Drop for ZmqSignalFeed {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Decode `[name, signal]`; a single frame is taken as the signal itself.
fn decode(zmq_msg: ZmqMessage) -> Option<Signal> {
    let frames: Vec<_> = zmq_msg.iter().collect();
    let payload = frames.get(1).or_else(|| frames.first())?;
    match Signal::from_bytes(payload.as_ref()) {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!(error = %e, "dropping undecodable signal");
            None
        }
    }
}

/// Encode a signal the way [`ZmqSignalFeed`] expects it.
pub fn encode(signal: &Signal) -> Result<ZmqMessage, UnitBusError> {
    let mut zmq_msg = ZmqMessage::from(signal.name.as_str());
    zmq_msg.push_back(signal.to_bytes()?.into());
    Ok(zmq_msg)
}

/// Signal connection: the SUB feed plus its own DEALER for lookups.
pub struct ZmqSignalConnection {
    feed: ZmqSignalFeed,
    calls: ZmqBusClient,
}

impl ZmqSignalConnection {
    /// Connect both sockets. `lookup_timeout` bounds each lookup call.
    pub async fn connect(
        signals: &Transport,
        methods: &Transport,
        capacity: usize,
        lookup_timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<Signal>), UnitBusError> {
        let (feed, signal_rx) = ZmqSignalFeed::connect(signals, capacity).await?;
        let calls = ZmqBusClient::connect(methods, lookup_timeout).await?;
        Ok((Self { feed, calls }, signal_rx))
    }
}

#[async_trait]
impl UnitLookup for ZmqSignalConnection {
    async fn get_unit(&self, name: &str) -> Result<ObjectPath, UnitBusError> {
        self.calls.get_unit(name).await
    }

    async fn get_unit_properties(
        &self,
        path: &ObjectPath,
    ) -> Result<UnitProperties, UnitBusError> {
        self.calls.get_unit_properties(path).await
    }

    async fn get_unit_file_state(&self, name: &str) -> Result<String, UnitBusError> {
        self.calls.get_unit_file_state(name).await
    }
}

#[async_trait]
impl SignalConnection for ZmqSignalConnection {
    async fn add_match(&self, signal: &str) -> Result<(), UnitBusError> {
        self.feed.add_match(signal).await
    }

    async fn subscribe(&self) -> Result<(), UnitBusError> {
        self.calls
            .call(names::SUBSCRIBE, crate::reqrep::MANAGER_PATH, Vec::new())
            .await
            .map(drop)
    }

    async fn unsubscribe(&self) -> Result<(), UnitBusError> {
        self.calls
            .call(names::UNSUBSCRIBE, crate::reqrep::MANAGER_PATH, Vec::new())
            .await
            .map(drop)
    }
}
