//! Help request endpoints

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{bad_request, internal_error, not_found};
use crate::matching::{match_volunteers, nearby_tasks};
use crate::middleware::session_auth;
use crate::models::{ApiResponse, NewTask, Task, TaskError, VolunteerMatch};
use crate::proximity::{GeoPoint, MatchMode};
use crate::AppState;

const DEFAULT_RADIUS_M: f64 = 5_000.0;
const MAX_RADIUS_M: f64 = 50_000.0;

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    lat: f64,
    lng: f64,
    radius: Option<f64>,
    category: Option<String>,
}

#[derive(Serialize)]
struct CreatedTask {
    task: Task,
    matches: Vec<VolunteerMatch>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/tasks")
            .route("", web::post().to(create_task))
            // Before /{id} so "nearby" is not taken for an id
            .route("/nearby", web::get().to(list_nearby))
            .route("/{id}", web::get().to(get_task))
            .route("/{id}/matches", web::get().to(get_matches))
            .route("/{id}/accept", web::post().to(accept_task))
            .route("/{id}/complete", web::post().to(complete_task)),
    );
}

fn validate_new_task(task: &NewTask) -> Result<(), String> {
    if task.title.trim().is_empty() {
        return Err("Title is required".to_string());
    }
    if task.description.trim().is_empty() {
        return Err("Description is required".to_string());
    }
    if !GeoPoint::new(task.latitude, task.longitude).is_valid() {
        return Err("Invalid coordinates".to_string());
    }
    if task.reward < 0.0 || !task.reward.is_finite() {
        return Err("Reward must be a non-negative number".to_string());
    }
    Ok(())
}

pub(crate) fn task_error_response(err: TaskError) -> HttpResponse {
    match err {
        TaskError::NotFound => not_found("Task not found"),
        TaskError::OwnTask | TaskError::NotParticipant => {
            HttpResponse::Forbidden().json(ApiResponse::fail(err.to_string()))
        }
        TaskError::InvalidState(..) => HttpResponse::Conflict().json(ApiResponse::fail(err.to_string())),
        TaskError::Database(e) => internal_error("Task update failed", e),
    }
}

async fn create_task(state: web::Data<AppState>, req: HttpRequest, body: web::Json<NewTask>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Err(msg) = validate_new_task(&body) {
        return bad_request(msg);
    }

    let task = match state.db.create_task(session.account_id, &body) {
        Ok(task) => task,
        Err(e) => return internal_error("Failed to create task", e),
    };
    log::info!("Task {} created by account {} ({})", task.id, task.creator_id, task.category);

    let matches = match match_volunteers(&state.db, task.location(), task.creator_id, MatchMode::Routine) {
        Ok(matches) => matches,
        Err(e) => {
            log::error!("Matching failed for task {}: {}", task.id, e);
            Vec::new()
        }
    };

    HttpResponse::Created().json(ApiResponse::ok(CreatedTask { task, matches }))
}

async fn list_nearby(state: web::Data<AppState>, req: HttpRequest, query: web::Query<NearbyQuery>) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    let reference = GeoPoint::new(query.lat, query.lng);
    if !reference.is_valid() {
        return bad_request("Invalid coordinates");
    }
    let radius = query.radius.unwrap_or(DEFAULT_RADIUS_M);
    if !(radius > 0.0 && radius <= MAX_RADIUS_M) {
        return bad_request(format!("Radius must be in (0, {}] meters", MAX_RADIUS_M));
    }

    let category = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    match state.db.list_pending_tasks(category) {
        Ok(tasks) => HttpResponse::Ok().json(ApiResponse::ok(nearby_tasks(reference, tasks, radius))),
        Err(e) => internal_error("Failed to list tasks", e),
    }
}

async fn get_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    match state.db.get_task(path.into_inner()) {
        Ok(Some(task)) => HttpResponse::Ok().json(ApiResponse::ok(task)),
        Ok(None) => not_found("Task not found"),
        Err(e) => internal_error("Failed to load task", e),
    }
}

async fn get_matches(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    let task = match state.db.get_task(path.into_inner()) {
        Ok(Some(task)) => task,
        Ok(None) => return not_found("Task not found"),
        Err(e) => return internal_error("Failed to load task", e),
    };

    let mode = if task.is_emergency() {
        MatchMode::Emergency
    } else {
        MatchMode::Routine
    };
    match match_volunteers(&state.db, task.location(), task.creator_id, mode) {
        Ok(matches) => HttpResponse::Ok().json(ApiResponse::ok(matches)),
        Err(e) => internal_error("Matching failed", e),
    }
}

async fn accept_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.accept_task(path.into_inner(), session.account_id) {
        Ok(task) => {
            log::info!("Task {} accepted by account {}", task.id, session.account_id);
            HttpResponse::Ok().json(ApiResponse::ok(task))
        }
        Err(e) => task_error_response(e),
    }
}

async fn complete_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.complete_task(path.into_inner(), session.account_id) {
        Ok(task) => HttpResponse::Ok().json(ApiResponse::ok(task)),
        Err(e) => task_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use crate::models::TaskStatus;

    fn new_task() -> NewTask {
        NewTask {
            title: "Walk the dog".into(),
            description: "Twice around the park".into(),
            category: None,
            reward: 0.0,
            latitude: 31.2,
            longitude: 121.4,
            address: "Park".into(),
            deadline: None,
        }
    }

    #[test]
    fn test_task_validation() {
        assert!(validate_new_task(&new_task()).is_ok());
        assert!(validate_new_task(&NewTask { title: " ".into(), ..new_task() }).is_err());
        assert!(validate_new_task(&NewTask { latitude: 91.0, ..new_task() }).is_err());
        assert!(validate_new_task(&NewTask { reward: -1.0, ..new_task() }).is_err());
    }

    #[test]
    fn test_task_errors_map_to_status_codes() {
        assert_eq!(task_error_response(TaskError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(task_error_response(TaskError::OwnTask).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            task_error_response(TaskError::InvalidState(TaskStatus::Assigned, TaskStatus::Pending)).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            task_error_response(TaskError::Database(rusqlite::Error::InvalidQuery)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
