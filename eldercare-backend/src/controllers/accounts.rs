//! Account registration and profiles

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{bad_request, internal_error, not_found};
use crate::db::is_unique_violation;
use crate::middleware::session_auth;
use crate::models::{Account, AccountUpdate, ApiResponse, NewAccount};
use crate::AppState;

const MAX_NICKNAME_CHARS: usize = 25;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{5,20}$").expect("phone pattern is valid"));

#[derive(Serialize)]
struct RegisterResponse {
    account: Account,
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CheckPhoneQuery {
    phone: String,
}

#[derive(Serialize)]
struct PhoneStatus {
    registered: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/accounts")
            .route("/register", web::post().to(register))
            .route("/check-phone", web::get().to(check_phone))
            .route("/me", web::get().to(get_me))
            .route("/me", web::put().to(update_me))
            .route("/{id}", web::get().to(get_profile)),
    );
}

fn validate_nickname(nickname: &str) -> Result<(), String> {
    let chars = nickname.trim().chars().count();
    if chars == 0 || chars > MAX_NICKNAME_CHARS {
        return Err(format!("Nickname must be 1-{} characters", MAX_NICKNAME_CHARS));
    }
    Ok(())
}

fn validate_new_account(new: &NewAccount) -> Result<(), String> {
    validate_nickname(&new.nickname)?;
    if !PHONE_RE.is_match(new.phone.trim()) {
        return Err("Invalid phone number".to_string());
    }
    if new.age < 0 || new.age > 150 {
        return Err("Invalid age".to_string());
    }
    Ok(())
}

async fn register(state: web::Data<AppState>, body: web::Json<NewAccount>) -> impl Responder {
    if let Err(msg) = validate_new_account(&body) {
        return bad_request(msg);
    }

    let account = match state.db.create_account(&body) {
        Ok(account) => account,
        Err(e) if is_unique_violation(&e) => {
            return HttpResponse::Conflict().json(ApiResponse::fail("Phone number already registered"));
        }
        Err(e) => return internal_error("Failed to create account", e),
    };

    match state.db.create_session(account.id, state.config.session_ttl()) {
        Ok(session) => {
            log::info!("Registered account {} ({})", account.id, account.role);
            HttpResponse::Created().json(ApiResponse::ok(RegisterResponse {
                account,
                token: session.token,
                expires_at: session.expires_at,
            }))
        }
        Err(e) => internal_error("Failed to create session", e),
    }
}

/// Lets the sign-up form tell a taken number apart before submitting
async fn check_phone(state: web::Data<AppState>, query: web::Query<CheckPhoneQuery>) -> impl Responder {
    if !PHONE_RE.is_match(query.phone.trim()) {
        return bad_request("Invalid phone number");
    }

    match state.db.phone_registered(&query.phone) {
        Ok(registered) => HttpResponse::Ok().json(ApiResponse::ok(PhoneStatus { registered })),
        Err(e) => internal_error("Failed to check phone number", e),
    }
}

async fn get_me(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match state.db.get_account(session.account_id) {
        Ok(Some(account)) => HttpResponse::Ok().json(ApiResponse::ok(account)),
        Ok(None) => not_found("Account not found"),
        Err(e) => internal_error("Failed to load account", e),
    }
}

async fn update_me(state: web::Data<AppState>, req: HttpRequest, body: web::Json<AccountUpdate>) -> impl Responder {
    let session = match session_auth::authenticate(&state.db, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    if let Some(nickname) = &body.nickname {
        if let Err(msg) = validate_nickname(nickname) {
            return bad_request(msg);
        }
    }
    if matches!(body.age, Some(age) if !(0..=150).contains(&age)) {
        return bad_request("Invalid age");
    }

    match state.db.update_account(session.account_id, &body) {
        Ok(Some(account)) => HttpResponse::Ok().json(ApiResponse::ok(account)),
        Ok(None) => not_found("Account not found"),
        Err(e) => internal_error("Failed to update account", e),
    }
}

async fn get_profile(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    if let Err(resp) = session_auth::authenticate(&state.db, &req) {
        return resp;
    }

    match state.db.get_account(path.into_inner()) {
        Ok(Some(account)) => HttpResponse::Ok().json(ApiResponse::ok(account.to_profile())),
        Ok(None) => not_found("Account not found"),
        Err(e) => internal_error("Failed to load account", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountRole, Sex};

    fn new_account(nickname: &str, phone: &str) -> NewAccount {
        NewAccount {
            nickname: nickname.to_string(),
            phone: phone.to_string(),
            sex: Sex::Man,
            age: 70,
            role: AccountRole::User,
            avatar: String::new(),
        }
    }

    #[test]
    fn test_registration_validation() {
        assert!(validate_new_account(&new_account("Grace", "+8613800000001")).is_ok());
        assert!(validate_new_account(&new_account("", "13800000001")).is_err());
        assert!(validate_new_account(&new_account(&"x".repeat(26), "13800000001")).is_err());
        assert!(validate_new_account(&new_account("Grace", "1234")).is_err());
        assert!(validate_new_account(&new_account("Grace", "138-0000-0001")).is_err());
    }

    #[test]
    fn test_nickname_counts_characters_not_bytes() {
        assert!(validate_nickname(&"é".repeat(25)).is_ok());
    }
}
