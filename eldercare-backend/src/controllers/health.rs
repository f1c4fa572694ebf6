use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::models::ApiResponse;
use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/version").route(web::get().to(get_version)));
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    /// None when the fan-out loop is not answering
    online_connections: Option<usize>,
    relay_pending: Option<i64>,
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let online_connections = state.gateway.fanout().online().await.ok().map(|ids| ids.len());
    let relay_pending = match state.gateway.relay().pending_count() {
        Ok(count) => Some(count),
        Err(e) => {
            log::error!("Failed to count pending relay entries: {}", e);
            None
        }
    };

    let status = if online_connections.is_some() && relay_pending.is_some() {
        "ok"
    } else {
        "degraded"
    };

    HttpResponse::Ok().json(ApiResponse::ok(HealthStatus {
        status,
        version: VERSION,
        online_connections,
        relay_pending,
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}
