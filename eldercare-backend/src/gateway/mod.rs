pub mod actix_ws;
pub mod fanout;
pub mod protocol;
pub mod sequence;

pub use fanout::{Connection, FanoutHandle};
pub use protocol::ServerFrame;
pub use sequence::MessageSequence;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::relay::SqliteRelayLog;

/// Realtime side of the service: the fan-out loop plus what sockets need to join it
pub struct Gateway {
    fanout: FanoutHandle,
    sequence: Arc<MessageSequence>,
    relay: Arc<SqliteRelayLog>,
    outbound_buffer: usize,
}

impl Gateway {
    /// Seed the message sequence from storage and start the fan-out loop
    pub fn start(
        db: &Database,
        relay: Arc<SqliteRelayLog>,
        outbound_buffer: usize,
        cancel: CancellationToken,
    ) -> rusqlite::Result<(Self, JoinHandle<()>)> {
        let last_id = db.max_message_id()?.max(db.relay_max_message_id()?);
        log::info!("[FANOUT] Message ids continue after {}", last_id);

        let sequence = Arc::new(MessageSequence::starting_after(last_id));
        let (fanout, task) = fanout::spawn(sequence.clone(), relay.clone(), cancel);

        let gateway = Self {
            fanout,
            sequence,
            relay,
            outbound_buffer,
        };
        Ok((gateway, task))
    }

    pub fn fanout(&self) -> &FanoutHandle {
        &self.fanout
    }

    pub fn relay(&self) -> &Arc<SqliteRelayLog> {
        &self.relay
    }

    pub fn last_message_id(&self) -> i64 {
        self.sequence.current()
    }

    /// A fresh connection for `account_id`, not yet registered
    pub fn open_connection(&self, account_id: i64) -> (Connection, tokio::sync::mpsc::Receiver<Arc<ServerFrame>>) {
        Connection::open(account_id, self.outbound_buffer)
    }

    /// Push a frame to whichever recipients are online. Failures are logged, not returned.
    pub async fn notify(&self, recipients: Vec<i64>, frame: ServerFrame) {
        let event = frame.event_name();
        if recipients.is_empty() {
            return;
        }
        if let Err(e) = self.fanout.notify(recipients, frame).await {
            log::error!("[FANOUT] Could not queue {} notification: {}", event, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_utc;
    use crate::gateway::protocol::ClientFrame;
    use crate::models::{ChatMessage, MessageKind};
    use crate::relay::{publish_chat, CHAT_TOPIC};

    #[tokio::test]
    async fn test_sequence_resumes_after_stored_and_relayed_ids() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let relay = Arc::new(SqliteRelayLog::new(db.clone(), CHAT_TOPIC));

        let stored = ChatMessage {
            id: 7,
            from: 1,
            to: 2,
            content: "stored".into(),
            kind: MessageKind::Text,
            time: now_utc(),
        };
        db.persist_chat_message(&stored).unwrap();
        // Relayed but not yet persisted when the process stopped
        publish_chat(relay.as_ref(), &ChatMessage { id: 12, ..stored.clone() }).unwrap();

        let cancel = CancellationToken::new();
        let (gateway, task) = Gateway::start(&db, relay, 4, cancel.clone()).unwrap();
        assert_eq!(gateway.last_message_id(), 12);

        let (connection, mut rx) = gateway.open_connection(1);
        gateway.fanout().register(connection).await.unwrap();
        gateway
            .fanout()
            .inbound(1, ClientFrame { to: 2, content: "next".into(), kind: MessageKind::Text })
            .await
            .unwrap();

        match rx.recv().await.unwrap().as_ref() {
            ServerFrame::Message(message) => assert_eq!(message.id, 13),
            other => panic!("unexpected frame {}", other.event_name()),
        }

        cancel.cancel();
        task.await.unwrap();
    }
}
