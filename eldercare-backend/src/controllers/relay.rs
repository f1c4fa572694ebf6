//! Dead letter inspection for the chat relay

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{internal_error, not_found, page_size};
use crate::middleware::session_auth;
use crate::models::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    limit: Option<usize>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/relay")
            .route("/dead-letters", web::get().to(list_dead_letters))
            .route("/dead-letters/{offset}/requeue", web::post().to(requeue)),
    );
}

async fn list_dead_letters(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<DeadLetterQuery>,
) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    let limit = page_size(query.limit, 50, 500);
    match state.gateway.relay().dead_letters(limit) {
        Ok(entries) => HttpResponse::Ok().json(ApiResponse::ok(entries)),
        Err(e) => internal_error("Failed to list dead letters", e),
    }
}

async fn requeue(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let offset = path.into_inner();
    match state.gateway.relay().requeue(offset) {
        Ok(true) => {
            log::info!("[RELAY] Offset {} requeued by account {}", offset, session.account_id);
            HttpResponse::Ok().json(ApiResponse::empty())
        }
        Ok(false) => not_found("No dead letter at that offset"),
        Err(e) => internal_error("Failed to requeue dead letter", e),
    }
}
