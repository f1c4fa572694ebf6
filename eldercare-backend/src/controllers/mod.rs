pub mod accounts;
pub mod auth;
pub mod chat;
pub mod evaluation;
pub mod health;
pub mod location;
pub mod relay;
pub mod sos;
pub mod tasks;

use actix_web::HttpResponse;

use crate::models::ApiResponse;

/// Log the real cause, answer with a generic 500
pub(crate) fn internal_error(context: &str, err: impl std::fmt::Display) -> HttpResponse {
    log::error!("{}: {}", context, err);
    HttpResponse::InternalServerError().json(ApiResponse::fail("Internal server error"))
}

pub(crate) fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::fail(message))
}

pub(crate) fn not_found(message: impl Into<String>) -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::fail(message))
}

/// Clamp a client-supplied page size
pub(crate) fn page_size(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}
