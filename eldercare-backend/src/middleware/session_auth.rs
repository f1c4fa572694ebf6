// Session authentication helpers
// Controllers call `authenticate` at the top of every protected handler; the
// websocket upgrade also accepts the token as a `?token=` query parameter
// because browsers can't set headers on a websocket handshake.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::Database;
use crate::models::{ApiResponse, Session};

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|s| !s.is_empty());

    from_header.or_else(|| query_token(req.query_string()))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn query_token(query: &str) -> Option<String> {
    web::Query::<TokenQuery>::from_query(query)
        .ok()
        .and_then(|q| q.into_inner().token)
        .filter(|token| !token.is_empty())
}

/// Resolve the caller's session or produce the 401/500 response to return
pub fn authenticate(db: &Arc<Database>, req: &HttpRequest) -> Result<Session, HttpResponse> {
    let token = extract_token(req)
        .ok_or_else(|| HttpResponse::Unauthorized().json(ApiResponse::fail("No authorization token provided")))?;

    match db.validate_session(&token) {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(HttpResponse::Unauthorized().json(ApiResponse::fail("Invalid or expired session"))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(ApiResponse::fail("Internal server error")))
        }
    }
}
