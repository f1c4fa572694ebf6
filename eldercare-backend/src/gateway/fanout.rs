//! Realtime fan-out loop
//!
//! A single task owns the registry of live connections (account id ->
//! connection). Sockets, HTTP handlers and tests talk to it only through
//! `FanoutHandle`, whose events are processed one at a time in the order they
//! were submitted.
//!
//! Writes to peers never block: each connection has a bounded outbound queue
//! and a full or closed queue gets the peer evicted. Every inbound chat
//! message is stamped with an id and server time, pushed to the sender and
//! recipient if online, then appended to the relay exactly once.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{ClientFrame, ServerFrame};
use super::sequence::MessageSequence;
use crate::db::now_utc;
use crate::models::ChatMessage;
use crate::relay::{publish_chat, RelayLog};

/// Queue depth between producers and the loop
const EVENT_BUFFER: usize = 1024;

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Write side of one live socket
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub account_id: i64,
    outbound: mpsc::Sender<Arc<ServerFrame>>,
}

impl Connection {
    /// New connection plus the receiver its writer task drains.
    /// When every sender is dropped the receiver yields None and the writer closes the socket.
    pub fn open(account_id: i64, buffer: usize) -> (Self, mpsc::Receiver<Arc<ServerFrame>>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            account_id,
            outbound,
        };
        (connection, rx)
    }
}

pub enum FanoutEvent {
    Register(Connection),
    /// Ignored unless `connection_id` is still the registered one
    Unregister { account_id: i64, connection_id: ConnectionId },
    Inbound { from: i64, frame: ClientFrame },
    /// Push a frame to whichever of `recipients` are online
    Notify { recipients: Vec<i64>, frame: ServerFrame },
    /// Sorted ids of online accounts
    Snapshot(oneshot::Sender<Vec<i64>>),
}

#[derive(Debug, Error)]
#[error("fan-out loop is not running")]
pub struct FanoutClosed;

/// Cloneable submission side of the loop
#[derive(Clone)]
pub struct FanoutHandle {
    events: mpsc::Sender<FanoutEvent>,
}

impl FanoutHandle {
    async fn submit(&self, event: FanoutEvent) -> Result<(), FanoutClosed> {
        self.events.send(event).await.map_err(|_| FanoutClosed)
    }

    pub async fn register(&self, connection: Connection) -> Result<(), FanoutClosed> {
        self.submit(FanoutEvent::Register(connection)).await
    }

    pub async fn unregister(&self, account_id: i64, connection_id: ConnectionId) -> Result<(), FanoutClosed> {
        self.submit(FanoutEvent::Unregister {
            account_id,
            connection_id,
        })
        .await
    }

    pub async fn inbound(&self, from: i64, frame: ClientFrame) -> Result<(), FanoutClosed> {
        self.submit(FanoutEvent::Inbound { from, frame }).await
    }

    pub async fn notify(&self, recipients: Vec<i64>, frame: ServerFrame) -> Result<(), FanoutClosed> {
        self.submit(FanoutEvent::Notify { recipients, frame }).await
    }

    pub async fn online(&self) -> Result<Vec<i64>, FanoutClosed> {
        let (tx, rx) = oneshot::channel();
        self.submit(FanoutEvent::Snapshot(tx)).await?;
        rx.await.map_err(|_| FanoutClosed)
    }
}

struct FanoutLoop {
    registry: HashMap<i64, Connection>,
    sequence: Arc<MessageSequence>,
    relay: Arc<dyn RelayLog>,
    clock: fn() -> DateTime<Utc>,
}

/// Start the loop on the current runtime
pub fn spawn(
    sequence: Arc<MessageSequence>,
    relay: Arc<dyn RelayLog>,
    cancel: CancellationToken,
) -> (FanoutHandle, JoinHandle<()>) {
    spawn_with_clock(sequence, relay, cancel, now_utc)
}

pub(crate) fn spawn_with_clock(
    sequence: Arc<MessageSequence>,
    relay: Arc<dyn RelayLog>,
    cancel: CancellationToken,
    clock: fn() -> DateTime<Utc>,
) -> (FanoutHandle, JoinHandle<()>) {
    let (events, rx) = mpsc::channel(EVENT_BUFFER);
    let fanout = FanoutLoop {
        registry: HashMap::new(),
        sequence,
        relay,
        clock,
    };
    let task = tokio::spawn(fanout.run(rx, cancel));
    (FanoutHandle { events }, task)
}

impl FanoutLoop {
    async fn run(mut self, mut events: mpsc::Receiver<FanoutEvent>, cancel: CancellationToken) {
        log::info!("[FANOUT] Loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }

        // Dropping the connections closes every socket
        let open = self.registry.len();
        self.registry.clear();
        log::info!("[FANOUT] Loop stopped, closed {} connection(s)", open);
    }

    fn handle(&mut self, event: FanoutEvent) {
        match event {
            FanoutEvent::Register(connection) => {
                let account_id = connection.account_id;
                log::debug!("[FANOUT] Register account {} (conn {})", account_id, connection.id);
                if let Some(replaced) = self.registry.insert(account_id, connection) {
                    log::info!(
                        "[FANOUT] Account {} reconnected, closing conn {}",
                        account_id,
                        replaced.id
                    );
                }
            }
            FanoutEvent::Unregister {
                account_id,
                connection_id,
            } => {
                let current = self.registry.get(&account_id).map(|c| c.id);
                if current == Some(connection_id) {
                    self.registry.remove(&account_id);
                    log::debug!("[FANOUT] Unregister account {} (conn {})", account_id, connection_id);
                }
            }
            FanoutEvent::Inbound { from, frame } => self.deliver(from, frame),
            FanoutEvent::Notify { recipients, frame } => {
                let frame = Arc::new(frame);
                for account_id in recipients {
                    self.push(account_id, &frame);
                }
            }
            FanoutEvent::Snapshot(reply) => {
                let mut online: Vec<i64> = self.registry.keys().copied().collect();
                online.sort_unstable();
                let _ = reply.send(online);
            }
        }
    }

    fn deliver(&mut self, from: i64, frame: ClientFrame) {
        let message = ChatMessage {
            id: self.sequence.next(),
            from,
            to: frame.to,
            content: frame.content,
            kind: frame.kind,
            time: (self.clock)(),
        };

        let outgoing = Arc::new(ServerFrame::Message(message.clone()));
        self.push(message.from, &outgoing);
        if !message.is_self_message() {
            self.push(message.to, &outgoing);
        }

        match publish_chat(self.relay.as_ref(), &message) {
            Ok(offset) => log::debug!("[FANOUT] Message {} relayed at offset {}", message.id, offset),
            Err(e) => log::error!("[FANOUT] Failed to relay message {}: {}", message.id, e),
        }
    }

    /// Non-blocking write; evicts the peer if its queue is full or gone
    fn push(&mut self, account_id: i64, frame: &Arc<ServerFrame>) {
        let Some(connection) = self.registry.get(&account_id) else {
            return;
        };

        match connection.outbound.try_send(frame.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!(
                    "[FANOUT] Account {} is not keeping up, dropping {} and closing",
                    account_id,
                    frame.event_name()
                );
                self.registry.remove(&account_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("[FANOUT] Account {} socket already gone, evicting", account_id);
                self.registry.remove(&account_id);
            }
        }
    }
}
