//! Realtime channel.
//!
//! One broadcast sender fans session/timer/result events out to every
//! connected WebSocket. Senders never block on slow clients; a lagging
//! receiver just drops to the next event.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    models::{CandidateTally, SessionStatus},
    state::SharedState,
};

#[derive(Clone, Debug, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    VotingStatus {
        status: SessionStatus,
    },
    SessionStarted,
    ShowPost {
        post: String,
        remaining_time: u64,
    },
    SessionEnded,
    ResultAnnounced {
        post: String,
        winner_id: i64,
        winner_name: String,
        winner_department: String,
        winner_year: String,
        total_votes_per_candidate: Vec<CandidateTally>,
        announced_at: DateTime<Utc>,
    },
    StudentCompleted {
        register_no: String,
        name: String,
    },
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Event>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Notifier { tx }
    }

    /// Fire-and-forget. A send with no connected clients is not an error.
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: SharedState) {
    // A fresh client gets a synthetic snapshot of current state instead of
    // waiting for the next tick.
    match state.controller.snapshot() {
        Ok(events) => {
            for event in events {
                if forward(&mut socket, &event).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            warn!("snapshot for new client failed: {e}");
            return;
        }
    }

    let mut rx = state.notifier.subscribe();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    if forward(&mut socket, &event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("client lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                // Votes and control actions go over HTTP; inbound frames are
                // only connection liveness.
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
        }
    }
}

async fn forward(socket: &mut WebSocket, event: &Event) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("unserializable event: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(payload.into())).await
}

#[cfg(test)]
mod tests {
    use super::Event;
    use crate::models::SessionStatus;

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(Event::ShowPost {
            post: "President".to_string(),
            remaining_time: 60,
        })
        .unwrap();
        assert_eq!(json["event"], "showPost");
        assert_eq!(json["data"]["post"], "President");
        assert_eq!(json["data"]["remainingTime"], 60);
    }

    #[test]
    fn test_unit_event_wire_shape() {
        let json = serde_json::to_value(Event::SessionEnded).unwrap();
        assert_eq!(json["event"], "sessionEnded");
    }

    #[test]
    fn test_status_event_snake_case_value() {
        let json = serde_json::to_value(Event::VotingStatus {
            status: SessionStatus::InProgress,
        })
        .unwrap();
        assert_eq!(json["data"]["status"], "in_progress");
    }
}
