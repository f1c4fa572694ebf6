//! Emergency (SOS) endpoints
//!
//! Raising an SOS creates an emergency task, finds helpers within the
//! emergency radius and pushes an alert to the ones who are online.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{bad_request, internal_error, not_found};
use crate::gateway::protocol::{SosAlert, ServerFrame};
use crate::matching::match_volunteers;
use crate::middleware::session_auth;
use crate::models::{ApiResponse, NewSos, SosError, SosRecord, VolunteerMatch};
use crate::proximity::{GeoPoint, MatchMode};
use crate::AppState;

#[derive(Serialize)]
struct EmergencyResponse {
    sos_id: i64,
    task_id: i64,
    matches: Vec<VolunteerMatch>,
    /// Seconds until the request times out
    timeout: i64,
    timeout_at: DateTime<Utc>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/sos")
            .route("/emergency", web::post().to(raise_emergency))
            .route("/current", web::get().to(current))
            .route("/{id}/accept", web::post().to(accept))
            .route("/{id}/resolve", web::put().to(resolve)),
    );
}

fn sos_error_response(err: SosError) -> HttpResponse {
    match err {
        SosError::NotFound => not_found("SOS not found"),
        SosError::NotParticipant => HttpResponse::Forbidden().json(ApiResponse::fail(err.to_string())),
        SosError::NotPending | SosError::AlreadyResolved => {
            HttpResponse::Conflict().json(ApiResponse::fail(err.to_string()))
        }
        SosError::Database(e) => internal_error("SOS update failed", e),
    }
}

fn alert_for(sos: &SosRecord, distance: f64) -> ServerFrame {
    ServerFrame::SosAlert(SosAlert {
        sos_id: sos.id,
        task_id: sos.task_id,
        user_id: sos.user_id,
        latitude: sos.latitude,
        longitude: sos.longitude,
        address: sos.address.clone(),
        description: sos.description.clone(),
        severity: sos.severity.clone(),
        distance,
        timeout_at: sos.timeout_at,
    })
}

async fn raise_emergency(state: web::Data<AppState>, req: HttpRequest, body: web::Json<NewSos>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let location = GeoPoint::new(body.latitude, body.longitude);
    if !location.is_valid() {
        return bad_request("Invalid coordinates");
    }

    let sos = match state
        .db
        .create_sos_with_task(session.account_id, &body, state.config.sos_timeout())
    {
        Ok(sos) => sos,
        Err(e) => return internal_error("Failed to create SOS", e),
    };
    log::warn!(
        "SOS {} raised by account {} at ({}, {}), severity {}",
        sos.id,
        sos.user_id,
        sos.latitude,
        sos.longitude,
        sos.severity
    );

    let matches = match match_volunteers(&state.db, location, sos.user_id, MatchMode::Emergency) {
        Ok(matches) => matches,
        Err(e) => {
            log::error!("Emergency matching failed for SOS {}: {}", sos.id, e);
            Vec::new()
        }
    };

    // Each helper gets their own distance, so one frame per recipient
    for candidate in &matches {
        state
            .gateway
            .notify(vec![candidate.account.id], alert_for(&sos, candidate.distance))
            .await;
    }

    HttpResponse::Created().json(ApiResponse::ok(EmergencyResponse {
        sos_id: sos.id,
        task_id: sos.task_id,
        matches,
        timeout: state.config.sos_timeout_secs,
        timeout_at: sos.timeout_at,
    }))
}

async fn accept(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.accept_sos(path.into_inner(), session.account_id) {
        Ok(sos) => {
            log::info!("SOS {} accepted by account {}", sos.id, session.account_id);
            HttpResponse::Ok().json(ApiResponse::ok(sos))
        }
        Err(e) => sos_error_response(e),
    }
}

async fn resolve(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.resolve_sos(path.into_inner(), session.account_id) {
        Ok(sos) => {
            log::info!("SOS {} resolved by account {}", sos.id, session.account_id);
            HttpResponse::Ok().json(ApiResponse::ok(sos))
        }
        Err(e) => sos_error_response(e),
    }
}

/// The caller's open SOS, `data: null` when there is none
async fn current(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.current_sos(session.account_id) {
        Ok(sos) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": sos,
        })),
        Err(e) => internal_error("Failed to load current SOS", e),
    }
}
