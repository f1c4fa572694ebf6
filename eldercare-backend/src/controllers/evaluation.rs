//! Account ratings, given after a helper finished a task

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{bad_request, internal_error, not_found};
use crate::middleware::session_auth;
use crate::models::evaluation::{is_valid_score, MAX_SCORE, MIN_SCORE};
use crate::models::{AccountEvaluation, ApiResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluationQuery {
    account_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    account_id: i64,
    score: i64,
}

#[derive(Serialize)]
struct EvaluationView {
    #[serde(flatten)]
    evaluation: AccountEvaluation,
    average: f64,
}

impl From<AccountEvaluation> for EvaluationView {
    fn from(evaluation: AccountEvaluation) -> Self {
        let average = evaluation.average();
        Self { evaluation, average }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/evaluation")
            .route("/account", web::get().to(get_evaluation))
            .route("/account", web::put().to(rate_account)),
    );
}

fn check_rating(rater_id: i64, query: &RateQuery) -> Result<(), String> {
    if !is_valid_score(query.score) {
        return Err(format!("Score must be between {} and {}", MIN_SCORE, MAX_SCORE));
    }
    if query.account_id == rater_id {
        return Err("Cannot rate your own account".to_string());
    }
    Ok(())
}

async fn get_evaluation(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<EvaluationQuery>,
) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    match state.db.get_evaluation(query.account_id) {
        Ok(Some(evaluation)) => HttpResponse::Ok().json(ApiResponse::ok(EvaluationView::from(evaluation))),
        Ok(None) => not_found("Account not found"),
        Err(e) => internal_error("Failed to load evaluation", e),
    }
}

async fn rate_account(state: web::Data<AppState>, req: HttpRequest, query: web::Query<RateQuery>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Err(msg) = check_rating(session.account_id, &query) {
        return bad_request(msg);
    }

    match state.db.evaluate_account(query.account_id, query.score) {
        Ok(Some(evaluation)) => {
            log::info!(
                "Account {} rated account {} with {}",
                session.account_id,
                query.account_id,
                query.score
            );
            HttpResponse::Ok().json(ApiResponse::ok(EvaluationView::from(evaluation)))
        }
        Ok(None) => not_found("Account not found"),
        Err(e) => internal_error("Failed to save evaluation", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_utc;

    #[test]
    fn test_score_must_be_one_to_five() {
        let rate = |score| RateQuery { account_id: 2, score };
        assert!(check_rating(1, &rate(1)).is_ok());
        assert!(check_rating(1, &rate(5)).is_ok());
        assert!(check_rating(1, &rate(0)).is_err());
        assert!(check_rating(1, &rate(6)).is_err());
        assert!(check_rating(1, &rate(-3)).is_err());
    }

    #[test]
    fn test_cannot_rate_self() {
        assert!(check_rating(2, &RateQuery { account_id: 2, score: 5 }).is_err());
    }

    #[test]
    fn test_view_includes_average() {
        let view = EvaluationView::from(AccountEvaluation {
            account_id: 2,
            score: 9,
            assign_count: 2,
            updated_at: now_utc(),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["account_id"], 2);
        assert_eq!(json["score"], 9);
        assert_eq!(json["average"], 4.5);
    }
}
