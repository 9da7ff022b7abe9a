use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::{AdminAuth, hash_password},
    db::{CandidateUpdate, PostTotal},
    error::AppError,
    models::{Candidate, Post, Student},
    realtime::Event,
    state::SharedState,
    utils::{normalize_register_no, sanitize_field},
};

// ---- session control ----

pub async fn control_start(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Value>, AppError> {
    let control = state.controller.start().await?;
    Ok(Json(json!({
        "message": "Voting started",
        "status": control.status,
        "currentPost": control.current_post,
    })))
}

pub async fn control_next(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Value>, AppError> {
    let control = state.controller.advance().await?;
    Ok(Json(json!({
        "message": "Moved to next post",
        "status": control.status,
        "currentPost": control.current_post,
    })))
}

pub async fn control_end(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Value>, AppError> {
    let control = state.controller.end().await?;
    Ok(Json(json!({
        "message": "Voting ended",
        "status": control.status,
    })))
}

// ---- results ----

pub async fn announce(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(post): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (result, winner) = state.store.announce(&post)?;

    // Both rows are committed; only now does the announcement go out.
    state.notifier.send(Event::ResultAnnounced {
        post: result.post.clone(),
        winner_id: winner.id,
        winner_name: winner.name.clone(),
        winner_department: winner.department.clone(),
        winner_year: winner.year.clone(),
        total_votes_per_candidate: result.total_votes_per_candidate.clone(),
        announced_at: result.announced_at,
    });

    Ok(Json(json!({
        "message": "Result announced",
        "result": result,
        "winner": {
            "id": winner.id,
            "name": winner.name,
            "department": winner.department,
            "year": winner.year,
        },
    })))
}

// ---- students ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    register_no: Option<String>,
    name: Option<String>,
    password: Option<String>,
    year: Option<String>,
    department: Option<String>,
}

pub async fn add_student(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Json(payload): Json<NewStudent>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (register_no, name, password, year, department) = match (
        payload.register_no,
        payload.name,
        payload.password,
        payload.year,
        payload.department,
    ) {
        (Some(r), Some(n), Some(p), Some(y), Some(d))
            if ![&r, &n, &p, &y, &d].iter().any(|f| f.trim().is_empty()) =>
        {
            (r, n, p, y, d)
        }
        _ => return Err(AppError::Validation("All fields are required".to_string())),
    };

    let register_no = normalize_register_no(&register_no);
    if register_no.is_empty() {
        return Err(AppError::Validation("Invalid register number".to_string()));
    }

    let student = state.store.insert_student(
        &register_no,
        &sanitize_field(&name),
        &sanitize_field(&department),
        &sanitize_field(&year),
        &hash_password(&password),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Student created successfully",
            "student": student,
        })),
    ))
}

pub async fn list_students(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Student>>, AppError> {
    Ok(Json(state.store.students()?))
}

// ---- candidates ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCandidate {
    name: Option<String>,
    post: Option<String>,
    department: Option<String>,
    year: Option<String>,
    manifesto: Option<String>,
    photo_url: Option<String>,
}

pub async fn add_candidate(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Json(payload): Json<NewCandidate>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (name, post, department, year, manifesto) = match (
        payload.name,
        payload.post,
        payload.department,
        payload.year,
        payload.manifesto,
    ) {
        (Some(n), Some(p), Some(d), Some(y), Some(m))
            if ![&n, &p, &d, &y, &m].iter().any(|f| f.trim().is_empty()) =>
        {
            (n, p, d, y, m)
        }
        _ => {
            return Err(AppError::Validation(
                "All fields except photoUrl are required".to_string(),
            ));
        }
    };

    let candidate = state.store.insert_candidate(
        &sanitize_field(&name),
        &post,
        &sanitize_field(&department),
        &sanitize_field(&year),
        &manifesto,
        payload.photo_url.as_deref().unwrap_or(""),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Candidate created successfully",
            "candidate": candidate,
        })),
    ))
}

/// Admin view keeps the tallies visible.
pub async fn list_candidates(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    Ok(Json(state.store.candidates()?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePatch {
    name: Option<String>,
    post: Option<String>,
    department: Option<String>,
    year: Option<String>,
    manifesto: Option<String>,
    photo_url: Option<String>,
}

pub async fn update_candidate(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<CandidatePatch>,
) -> Result<Json<Value>, AppError> {
    let candidate = state.store.update_candidate(
        id,
        CandidateUpdate {
            name: payload.name.map(|s| sanitize_field(&s)),
            post: payload.post,
            department: payload.department.map(|s| sanitize_field(&s)),
            year: payload.year.map(|s| sanitize_field(&s)),
            manifesto: payload.manifesto,
            photo_url: payload.photo_url,
        },
    )?;

    Ok(Json(json!({
        "message": "Candidate updated successfully",
        "candidate": candidate,
    })))
}

pub async fn delete_candidate(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_candidate(id)?;
    Ok(Json(json!({
        "message": "Candidate and related votes deleted successfully",
    })))
}

pub async fn reconcile_candidate(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let candidate = state.store.reconcile_candidate(id)?;
    Ok(Json(json!({
        "message": "Vote count reconciled from ledger",
        "candidate": candidate,
    })))
}

// ---- posts ----

pub async fn list_posts(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.store.posts()?))
}

pub async fn restore_posts(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Value>, AppError> {
    let posts = state.store.seed_posts()?;
    Ok(Json(json!({
        "message": "Posts restored successfully",
        "posts": posts,
    })))
}

pub async fn post_totals(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Vec<PostTotal>>, AppError> {
    Ok(Json(state.store.post_totals()?))
}
