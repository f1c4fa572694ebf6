use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::internal_error;
use crate::middleware::session_auth;
use crate::models::ApiResponse;
use crate::AppState;

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/logout", web::post().to(logout))
            .route("/validate", web::get().to(validate)),
    );
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let Some(token) = session_auth::extract_token(&req) else {
        return HttpResponse::Unauthorized().json(ApiResponse::fail("No authorization token provided"));
    };

    match state.db.delete_session(&token) {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::empty()),
        Err(e) => internal_error("Failed to delete session", e),
    }
}

async fn validate(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let token = match session_auth::extract_token(&req) {
        Some(t) => t,
        None => {
            return HttpResponse::Ok().json(ApiResponse::ok(ValidateResponse {
                valid: false,
                account_id: None,
                expires_at: None,
            }))
        }
    };

    match state.db.validate_session(&token) {
        Ok(session) => HttpResponse::Ok().json(ApiResponse::ok(ValidateResponse {
            valid: session.is_some(),
            account_id: session.as_ref().map(|s| s.account_id),
            expires_at: session.map(|s| s.expires_at),
        })),
        Err(e) => internal_error("Session validation error", e),
    }
}
