use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Duration;
use serde::Deserialize;

use super::{bad_request, internal_error, not_found, page_size};
use crate::db::now_utc;
use crate::gateway::protocol::{LocationUpdated, ServerFrame};
use crate::middleware::session_auth;
use crate::models::{AccountRole, ApiResponse, LocationUpdate};
use crate::proximity::{navigate, rank_within_radius, GeoPoint};
use crate::AppState;

const DEFAULT_RADIUS_M: f64 = 5_000.0;
const MAX_RADIUS_M: f64 = 50_000.0;
const NEARBY_LIMIT: usize = 50;
/// Positions older than this don't count as "nearby"
const FRESHNESS_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    lat: f64,
    lng: f64,
    radius: Option<f64>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NavigationQuery {
    from_lat: f64,
    from_lng: f64,
    to_lat: f64,
    to_lng: f64,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/location")
            .route("", web::post().to(report_location))
            .route("/user/{id}", web::get().to(latest_for_user))
            .route("/history", web::get().to(history))
            .route("/nearby", web::get().to(nearby))
            .route("/navigation", web::get().to(navigation)),
    );
}

async fn report_location(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LocationUpdate>,
) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if !GeoPoint::new(body.latitude, body.longitude).is_valid() {
        return bad_request("Invalid coordinates");
    }

    let location = match state.db.record_location(session.account_id, &body) {
        Ok(location) => location,
        Err(e) => return internal_error("Failed to record location", e),
    };

    match state.db.contact_ids(session.account_id) {
        Ok(contacts) => {
            let frame = ServerFrame::LocationUpdated(LocationUpdated {
                account_id: location.account_id,
                latitude: location.latitude,
                longitude: location.longitude,
                address: location.address.clone(),
                time: location.created_at,
            });
            state.gateway.notify(contacts, frame).await;
        }
        Err(e) => log::error!("Failed to load contacts of account {}: {}", session.account_id, e),
    }

    HttpResponse::Ok().json(ApiResponse::ok(location))
}

async fn latest_for_user(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    match state.db.latest_location(path.into_inner()) {
        Ok(Some(location)) => HttpResponse::Ok().json(ApiResponse::ok(location)),
        Ok(None) => not_found("No location reported"),
        Err(e) => internal_error("Failed to load location", e),
    }
}

async fn history(state: web::Data<AppState>, req: HttpRequest, query: web::Query<HistoryQuery>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let limit = page_size(query.limit, 10, 100);
    match state.db.location_history(session.account_id, limit) {
        Ok(locations) => HttpResponse::Ok().json(ApiResponse::ok(locations)),
        Err(e) => internal_error("Failed to load location history", e),
    }
}

async fn nearby(state: web::Data<AppState>, req: HttpRequest, query: web::Query<NearbyQuery>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let reference = GeoPoint::new(query.lat, query.lng);
    if !reference.is_valid() {
        return bad_request("Invalid coordinates");
    }
    let radius = query.radius.unwrap_or(DEFAULT_RADIUS_M);
    if !(radius > 0.0 && radius <= MAX_RADIUS_M) {
        return bad_request(format!("Radius must be in (0, {}] meters", MAX_RADIUS_M));
    }
    let role = match query.role.as_deref().map(str::parse::<AccountRole>) {
        None => AccountRole::Volunteer,
        Some(Ok(role)) => role,
        Some(Err(_)) => return bad_request("Unknown role"),
    };

    let since = now_utc() - Duration::hours(FRESHNESS_HOURS);
    let candidates = match state.db.recent_locations_by_role(role, &since) {
        Ok(locations) => locations,
        Err(e) => return internal_error("Failed to load recent locations", e),
    };

    let others = candidates.into_iter().filter(|l| l.account_id != session.account_id);
    let ranked = rank_within_radius(reference, others, radius, NEARBY_LIMIT);
    HttpResponse::Ok().json(ApiResponse::ok(ranked))
}

async fn navigation(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<NavigationQuery>,
) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    let start = GeoPoint::new(query.from_lat, query.from_lng);
    let end = GeoPoint::new(query.to_lat, query.to_lng);
    if !start.is_valid() || !end.is_valid() {
        return bad_request("Invalid coordinates");
    }

    HttpResponse::Ok().json(ApiResponse::ok(navigate(start, end)))
}
