use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::{auth::StudentAuth, error::AppError, state::SharedState};

pub async fn current_post(
    _auth: StudentAuth,
    State(state): State<SharedState>,
) -> Result<Json<Value>, AppError> {
    let control = state.store.get_control()?;
    Ok(Json(json!({
        "status": control.status,
        "currentPost": control.current_post,
        "postStartAt": control.post_start_at,
    })))
}
