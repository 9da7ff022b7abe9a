//! Session lifecycle, timer auto-advance and reconnect snapshots.

use std::time::Duration;

use forum::{
    db::Store,
    error::AppError,
    models::SessionStatus,
    realtime::{Event, Notifier},
    session::SessionController,
};
use tokio::{sync::broadcast, time::timeout};

fn fixture() -> (Store, Notifier) {
    let store = Store::open_in_memory().unwrap();
    store.seed_posts().unwrap();
    (store, Notifier::new(64))
}

async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Waits for the next showPost naming a different post than `current`.
async fn next_post_shown(rx: &mut broadcast::Receiver<Event>, current: &str) -> (String, u64) {
    loop {
        if let Event::ShowPost {
            post,
            remaining_time,
        } = next_event(rx).await
        {
            if post != current {
                return (post, remaining_time);
            }
        }
    }
}

#[tokio::test]
async fn test_start_broadcasts_session_and_first_post() {
    let (store, notifier) = fixture();
    let controller = SessionController::new(store, notifier.clone(), 60);
    let mut rx = notifier.subscribe();

    controller.start().await.unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        Event::VotingStatus {
            status: SessionStatus::InProgress
        }
    ));
    assert!(matches!(next_event(&mut rx).await, Event::SessionStarted));
    match next_event(&mut rx).await {
        Event::ShowPost {
            post,
            remaining_time,
        } => {
            assert_eq!(post, "President");
            assert_eq!(remaining_time, 60);
        }
        other => panic!("expected showPost, got {other:?}"),
    }

    controller.end().await.unwrap();
}

#[tokio::test]
async fn test_window_expiry_advances_to_next_post() {
    let (store, notifier) = fixture();
    // One-second window ticked fast, so expiry is observable in test time.
    let controller = SessionController::with_timing(
        store.clone(),
        notifier.clone(),
        1,
        Duration::from_millis(50),
    );
    let mut rx = notifier.subscribe();

    controller.start().await.unwrap();
    let (post, remaining) = next_post_shown(&mut rx, "President").await;

    // The countdown reset for the next post in order.
    assert_eq!(post, "Vice President");
    assert_eq!(remaining, 1);

    let control = store.get_control().unwrap();
    assert_eq!(control.status, SessionStatus::InProgress);
    assert_eq!(control.current_post_index, 1);

    controller.end().await.unwrap();
}

#[tokio::test]
async fn test_manual_advance_walks_the_post_order() {
    let (store, notifier) = fixture();
    let controller = SessionController::new(store.clone(), notifier, 3600);

    controller.start().await.unwrap();
    let control = controller.advance().await.unwrap();
    assert_eq!(control.current_post.as_deref(), Some("Vice President"));

    // Seven more advances run off the end of the post list.
    for _ in 0..7 {
        controller.advance().await.unwrap();
    }

    let control = store.get_control().unwrap();
    assert_eq!(control.status, SessionStatus::Ended);
    assert!(control.current_post.is_none());
    assert!(control.post_start_at.is_none());

    let err = controller.advance().await.unwrap_err();
    assert!(matches!(err, AppError::VotingClosed(_)));
}

#[tokio::test]
async fn test_end_silences_the_timer() {
    let (store, notifier) = fixture();
    let controller = SessionController::with_timing(
        store.clone(),
        notifier.clone(),
        1,
        Duration::from_millis(50),
    );

    controller.start().await.unwrap();
    controller.end().await.unwrap();

    // Give a stale timer every chance to misbehave.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let control = store.get_control().unwrap();
    assert_eq!(control.status, SessionStatus::Ended);
    assert!(control.current_post.is_none());
}

#[tokio::test]
async fn test_snapshot_matches_live_countdown() {
    let (store, notifier) = fixture();
    let controller = SessionController::new(store.clone(), notifier, 60);

    // Not started: status only.
    let events = controller.snapshot().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Event::VotingStatus {
            status: SessionStatus::NotStarted
        }
    ));

    controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let control = store.get_control().unwrap();
    let live = controller.remaining_from(control.post_start_at.unwrap());

    let events = controller.snapshot().unwrap();
    let shown = events
        .iter()
        .find_map(|e| match e {
            Event::ShowPost {
                post,
                remaining_time,
            } => Some((post.clone(), *remaining_time)),
            _ => None,
        })
        .expect("snapshot should include the current post");

    assert_eq!(shown.0, "President");
    // Same window constant on both paths; at most one tick of skew.
    assert!(shown.1.abs_diff(live) <= 1, "snapshot {} vs live {live}", shown.1);
    assert!(shown.1 < 60);

    controller.end().await.unwrap();

    let events = controller.snapshot().unwrap();
    assert!(events.iter().any(|e| matches!(e, Event::SessionEnded)));
}
