use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{error::AppError, realtime::Event, state::SharedState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    student_register_no: Option<String>,
    post: Option<String>,
    candidate_id: Option<i64>,
}

pub async fn cast_vote(
    State(state): State<SharedState>,
    Json(payload): Json<VotePayload>,
) -> Result<Json<Value>, AppError> {
    let (register_no, post, candidate_id) =
        match (payload.student_register_no, payload.post, payload.candidate_id) {
            (Some(register_no), Some(post), Some(candidate_id)) => (register_no, post, candidate_id),
            _ => return Err(AppError::Validation("All fields are required".to_string())),
        };

    let outcome = state.store.cast_vote(&register_no, &post, candidate_id)?;
    info!("vote accepted: {register_no} for {post}");

    // The ballot just became complete; tell everyone watching.
    if outcome.has_voted_all {
        state.notifier.send(Event::StudentCompleted {
            register_no: outcome.register_no,
            name: outcome.student_name,
        });
    }

    Ok(Json(json!({
        "message": "Vote submitted successfully",
        "hasVotedAll": outcome.has_voted_all,
    })))
}
