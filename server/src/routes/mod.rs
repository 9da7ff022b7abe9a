use axum::{
    Router,
    routing::{get, post, put},
};

use crate::{realtime, state::SharedState};

pub mod admin;
pub mod auth;
pub mod public;
pub mod student;
pub mod vote;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/admin/login", post(auth::admin_login))
        .route("/api/auth/student/login", post(auth::student_login))
        .route("/api/vote", post(vote::cast_vote))
        .route("/api/posts", get(public::posts))
        .route("/api/candidates/{post}", get(public::candidates_for_post))
        .route("/api/forum-committee", get(public::forum_committee))
        .route("/api/student/posts/current", get(student::current_post))
        .route("/api/admin/control/start", post(admin::control_start))
        .route("/api/admin/control/next", post(admin::control_next))
        .route("/api/admin/control/end", post(admin::control_end))
        .route("/api/admin/announce/{post}", post(admin::announce))
        .route(
            "/api/admin/students",
            post(admin::add_student).get(admin::list_students),
        )
        .route(
            "/api/admin/candidates",
            post(admin::add_candidate).get(admin::list_candidates),
        )
        .route(
            "/api/admin/candidates/{id}",
            put(admin::update_candidate).delete(admin::delete_candidate),
        )
        .route("/api/admin/posts", get(admin::list_posts))
        .route("/api/admin/posts/restore", post(admin::restore_posts))
        .route("/api/admin/post-totals", get(admin::post_totals))
        .route("/api/admin/reconcile/{id}", post(admin::reconcile_candidate))
        .route("/ws", get(realtime::ws_handler))
}
