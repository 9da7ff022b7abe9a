use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    error::AppError,
    models::{CommitteeSeat, Post, PublicCandidate},
    state::SharedState,
};

pub async fn posts(State(state): State<SharedState>) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.store.posts()?))
}

/// Candidates as voters see them: tallies stay hidden until announcement.
pub async fn candidates_for_post(
    State(state): State<SharedState>,
    Path(post): Path<String>,
) -> Result<Json<Vec<PublicCandidate>>, AppError> {
    let candidates = state
        .store
        .candidates_for_post(&post)?
        .into_iter()
        .map(PublicCandidate::from)
        .collect();
    Ok(Json(candidates))
}

pub async fn forum_committee(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CommitteeSeat>>, AppError> {
    Ok(Json(state.store.committee()?))
}
