use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    auth::{Role, verify_password},
    error::AppError,
    state::SharedState,
    utils::normalize_register_no,
};

#[derive(Deserialize)]
pub struct AdminLogin {
    email: Option<String>,
    password: Option<String>,
}

pub async fn admin_login(
    State(state): State<SharedState>,
    Json(payload): Json<AdminLogin>,
) -> Result<Json<Value>, AppError> {
    let (email, password) = match (payload.email, payload.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }
    };

    let admin = state
        .store
        .admin_by_email(&email)?
        .ok_or_else(invalid_credentials)?;
    if !verify_password(&password, &admin.password_hash) {
        return Err(invalid_credentials());
    }

    let token = state.sessions.issue(Role::Admin, admin.id, None);
    info!("admin login: {email}");

    Ok(Json(json!({
        "token": token,
        "admin": { "id": admin.id, "email": admin.email },
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLogin {
    register_no: Option<String>,
    password: Option<String>,
}

pub async fn student_login(
    State(state): State<SharedState>,
    Json(payload): Json<StudentLogin>,
) -> Result<Json<Value>, AppError> {
    let (register_no, password) = match (payload.register_no, payload.password) {
        (Some(register_no), Some(password)) if !register_no.is_empty() && !password.is_empty() => {
            (register_no, password)
        }
        _ => {
            return Err(AppError::Validation(
                "Register number and password are required".to_string(),
            ));
        }
    };

    let register_no = normalize_register_no(&register_no);
    let record = state
        .store
        .student_by_register_no(&register_no)?
        .ok_or_else(|| AppError::Auth("You are not authorized to vote.".to_string()))?;

    if !verify_password(&password, &record.password_hash) {
        return Err(invalid_credentials());
    }

    // A fully voted student has nothing left to do here.
    if record.student.has_voted_all {
        return Err(AppError::AlreadyVoted(
            "You have already cast your vote.".to_string(),
        ));
    }

    let token = state.sessions.issue(
        Role::Student,
        record.student.id,
        Some(record.student.register_no.clone()),
    );
    info!("student login: {register_no}");

    Ok(Json(json!({
        "token": token,
        "student": record.student,
    })))
}

fn invalid_credentials() -> AppError {
    AppError::Auth("Invalid credentials".to_string())
}
