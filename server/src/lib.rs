//! Forum committee election platform.
//!
//! Administrators define candidates for a fixed set of posts, open a voting
//! session that walks the posts in order with a countdown per post, and
//! announce results per post once voting is done. Students get one vote per
//! post while that post's window is open. Everyone connected over the
//! WebSocket channel sees session, countdown and result events live.
//!
//! # Pieces
//!
//! - [`session`]: the session state machine and the per-post timer. The one
//!   place that mutates session control state.
//! - [`ledger`]: vote casting, one transaction per ballot, with the
//!   storage-level duplicate backstop.
//! - [`results`]: tally reconciliation and winner announcement.
//! - [`realtime`]: the broadcast channel and the `/ws` endpoint.
//! - [`db`]: SQLite store shared by all of the above.
//!
//! The `seed` workspace crate owns operational setup (admin account, student
//! roster, post restoration).

use std::time::Duration;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod realtime;
pub mod results;
pub mod routes;
pub mod session;
pub mod state;
pub mod utils;

use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(
            state
                .config
                .frontend_origin
                .parse::<axum::http::HeaderValue>()
                .expect("Frontend origin misconfigured!"),
        )
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::router().layer(cors).with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
