//! Chat websocket endpoint
//!
//! Each socket gets two local tasks: a writer draining the connection's
//! outbound queue into the socket, and a reader that parses chat frames,
//! answers pings and enforces the heartbeat. The fan-out loop only ever sees
//! the queue, never the socket.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::fanout::{ConnectionId, FanoutHandle};
use super::protocol::{ClientFrame, ServerFrame};
use crate::middleware::session_auth;
use crate::models::ApiResponse;
use crate::AppState;

/// How often we ping the client
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Close when nothing was heard for this long (one interval plus the pong grace)
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(session) => session,
        Err(response) => return Ok(response),
    };
    let account_id = session.account_id;

    let (response, ws_session, stream) = actix_ws::handle(&req, body)?;

    let (connection, outbound) = state.gateway.open_connection(account_id);
    let connection_id = connection.id;
    let fanout = state.gateway.fanout().clone();
    if let Err(e) = fanout.register(connection).await {
        log::error!("[WS] Could not register account {}: {}", account_id, e);
        return Ok(HttpResponse::ServiceUnavailable().json(ApiResponse::fail("Chat is unavailable")));
    }
    log::info!("[WS] Account {} connected (conn {})", account_id, connection_id);

    actix_web::rt::spawn(write_frames(ws_session.clone(), outbound, account_id));
    actix_web::rt::spawn(read_frames(ws_session, stream, fanout, account_id, connection_id));

    Ok(response)
}

/// Drain the outbound queue into the socket. Ends when the fan-out loop drops
/// the connection (eviction, replacement, shutdown) or the socket is gone.
async fn write_frames(mut session: Session, mut outbound: mpsc::Receiver<Arc<ServerFrame>>, account_id: i64) {
    while let Some(frame) = outbound.recv().await {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                log::error!("[WS] Failed to encode {} for account {}: {}", frame.event_name(), account_id, e);
                continue;
            }
        };
        if session.text(text).await.is_err() {
            break;
        }
    }

    let _ = session.close(None).await;
    log::debug!("[WS] Writer for account {} finished", account_id);
}

async fn read_frames(
    mut session: Session,
    mut stream: MessageStream,
    fanout: FanoutHandle,
    account_id: i64,
    connection_id: ConnectionId,
) {
    let mut last_heard = Instant::now();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick fires immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if last_heard.elapsed() > CLIENT_TIMEOUT {
                    log::info!("[WS] Account {} timed out, closing", account_id);
                    break;
                }
                if session.ping(b"").await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        log::warn!("[WS] Protocol error from account {}: {}", account_id, e);
                        break;
                    }
                    None => break,
                };
                last_heard = Instant::now();

                match msg {
                    Message::Text(text) => match ClientFrame::parse(&text) {
                        Ok(frame) => {
                            if fanout.inbound(account_id, frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::debug!("[WS] Dropping frame from account {}: {}", account_id, e),
                    },
                    Message::Ping(bytes) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(reason) => {
                        log::debug!("[WS] Account {} closed: {:?}", account_id, reason);
                        break;
                    }
                    Message::Binary(_) => log::debug!("[WS] Ignoring binary frame from account {}", account_id),
                    _ => {}
                }
            }
        }
    }

    let _ = fanout.unregister(account_id, connection_id).await;
    let _ = session.close(None).await;
    log::info!("[WS] Account {} disconnected (conn {})", account_id, connection_id);
}
