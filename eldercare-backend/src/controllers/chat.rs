//! Chat history and contact list
//!
//! Live messaging goes over the websocket (`gateway::actix_ws`); these
//! endpoints only read what the relay consumer has persisted.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{bad_request, internal_error, page_size};
use crate::gateway::actix_ws;
use crate::middleware::session_auth;
use crate::models::ApiResponse;
use crate::AppState;

const DEFAULT_PAGE: usize = 10;
const MAX_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    account_id: i64,
    before_id: Option<i64>,
    size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ContactsQuery {
    /// RFC 3339 cursor from the previous page
    before: Option<String>,
    size: Option<usize>,
}

#[derive(Serialize)]
struct OnlineContacts {
    online: Vec<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/chat")
            .route("/record", web::get().to(get_record))
            .route("/contacts", web::get().to(get_contacts))
            .route("/online", web::get().to(get_online))
            .route("/ws", web::get().to(actix_ws::ws_handler)),
    );
}

async fn get_record(state: web::Data<AppState>, req: HttpRequest, query: web::Query<RecordQuery>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let size = page_size(query.size, DEFAULT_PAGE, MAX_PAGE);
    match state
        .db
        .list_messages_between(session.account_id, query.account_id, query.before_id, size)
    {
        Ok(messages) => HttpResponse::Ok().json(ApiResponse::ok(messages)),
        Err(e) => internal_error("Failed to load chat record", e),
    }
}

fn parse_cursor(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| format!("Invalid 'before' cursor: {}", s)),
    }
}

async fn get_contacts(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ContactsQuery>,
) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let before = match parse_cursor(query.before.as_deref()) {
        Ok(before) => before,
        Err(msg) => return bad_request(msg),
    };
    let size = page_size(query.size, DEFAULT_PAGE, MAX_PAGE);

    match state.db.list_contacts(session.account_id, before.as_ref(), size) {
        Ok(contacts) => HttpResponse::Ok().json(ApiResponse::ok(contacts)),
        Err(e) => internal_error("Failed to load contacts", e),
    }
}

/// Which of the caller's contacts currently have a socket open
async fn get_online(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let contacts = match state.db.contact_ids(session.account_id) {
        Ok(ids) => ids,
        Err(e) => return internal_error("Failed to load contacts", e),
    };
    let online = match state.gateway.fanout().online().await {
        Ok(online) => online,
        Err(e) => {
            log::error!("Fan-out loop unavailable: {}", e);
            return HttpResponse::ServiceUnavailable().json(ApiResponse::fail("Chat is unavailable"));
        }
    };

    // `online` is sorted
    let mut online: Vec<i64> = contacts
        .into_iter()
        .filter(|id| online.binary_search(id).is_ok())
        .collect();
    online.sort_unstable();
    HttpResponse::Ok().json(ApiResponse::ok(OnlineContacts { online }))
}
