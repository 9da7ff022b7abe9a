//! Session controller.
//!
//! Owns the one piece of global mutable state: the session control row and
//! the countdown timer for the current post. Every transition
//! (`start`/`advance`/`end`, manual or timer-driven) serializes through a
//! single async lock, and the timer handle lives on the controller itself so
//! only one timer can ever be active.
//!
//! The timer never trusts its own clock arithmetic across ticks: each tick
//! recomputes remaining time from the committed `post_start_at` and re-reads
//! the control row, so a timer superseded by a manual advance or an end
//! notices and cancels itself.

use std::{sync::Arc, sync::Mutex as StdMutex, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::{
    db::Store,
    error::AppError,
    models::{Post, SessionControl, SessionStatus},
    realtime::{Event, Notifier},
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct SessionController {
    store: Store,
    notifier: Notifier,
    window_secs: u64,
    tick: Duration,
    transitions: Mutex<()>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(store: Store, notifier: Notifier, window_secs: u64) -> Arc<Self> {
        Self::with_timing(store, notifier, window_secs, TICK_INTERVAL)
    }

    /// Same controller with a custom tick, for exercising the countdown at
    /// test speed.
    pub fn with_timing(
        store: Store,
        notifier: Notifier,
        window_secs: u64,
        tick: Duration,
    ) -> Arc<Self> {
        Arc::new(SessionController {
            store,
            notifier,
            window_secs,
            tick,
            transitions: Mutex::new(()),
            timer: StdMutex::new(None),
        })
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Opens the session on the first post. Rejected while a session is
    /// already running; a session that ended can be started again.
    pub async fn start(self: &Arc<Self>) -> Result<SessionControl, AppError> {
        let _guard = self.transitions.lock().await;

        let mut control = self.store.get_control()?;
        if control.status == SessionStatus::InProgress {
            return Err(AppError::VotingClosed(
                "Voting is already in progress".to_string(),
            ));
        }

        let posts = self.store.posts()?;
        if posts.is_empty() {
            return Err(AppError::Config("No posts configured".to_string()));
        }

        let first = posts[0].name.clone();
        control.status = SessionStatus::InProgress;
        control.current_post = Some(first.clone());
        control.current_post_index = 0;
        control.post_start_at = Some(Utc::now());
        self.store.save_control(&control)?;

        info!("voting session started, first post: {first}");
        self.notifier.send(Event::VotingStatus {
            status: SessionStatus::InProgress,
        });
        self.notifier.send(Event::SessionStarted);
        self.notifier.send(Event::ShowPost {
            post: first.clone(),
            remaining_time: self.window_secs,
        });
        self.restart_timer(first);

        Ok(control)
    }

    /// Manual advance to the next post, or to the end of the session.
    pub async fn advance(self: &Arc<Self>) -> Result<SessionControl, AppError> {
        let _guard = self.transitions.lock().await;

        let control = self.store.get_control()?;
        if control.status != SessionStatus::InProgress {
            return Err(AppError::VotingClosed(
                "Voting is not in progress".to_string(),
            ));
        }

        let posts = self.store.posts()?;
        self.advance_locked(control, &posts)
    }

    /// Forced end from any state.
    pub async fn end(self: &Arc<Self>) -> Result<SessionControl, AppError> {
        let _guard = self.transitions.lock().await;

        let mut control = self.store.get_control()?;
        control.status = SessionStatus::Ended;
        control.current_post = None;
        control.post_start_at = None;
        self.store.save_control(&control)?;

        self.cancel_timer();
        info!("voting session ended");
        self.notifier.send(Event::VotingStatus {
            status: SessionStatus::Ended,
        });
        self.notifier.send(Event::SessionEnded);

        Ok(control)
    }

    /// Events a freshly connected client needs to catch up: current status,
    /// and while in progress the current post with remaining time recomputed
    /// from the same window as the live countdown.
    pub fn snapshot(&self) -> Result<Vec<Event>, AppError> {
        let control = self.store.get_control()?;
        let mut events = vec![Event::VotingStatus {
            status: control.status,
        }];

        match control.status {
            SessionStatus::InProgress => {
                events.push(Event::SessionStarted);
                if let (Some(post), Some(started)) =
                    (control.current_post.clone(), control.post_start_at)
                {
                    let remaining = self.remaining_from(started);
                    if remaining > 0 {
                        events.push(Event::ShowPost {
                            post,
                            remaining_time: remaining,
                        });
                    }
                }
            }
            SessionStatus::Ended => events.push(Event::SessionEnded),
            SessionStatus::NotStarted => {}
        }

        Ok(events)
    }

    pub fn remaining_from(&self, started: DateTime<Utc>) -> u64 {
        let elapsed = (Utc::now() - started).num_seconds().max(0) as u64;
        self.window_secs.saturating_sub(elapsed)
    }

    /// Shared tail of every advance. Caller holds the transition lock.
    fn advance_locked(
        self: &Arc<Self>,
        mut control: SessionControl,
        posts: &[Post],
    ) -> Result<SessionControl, AppError> {
        let next = control.current_post_index + 1;

        if next as usize >= posts.len() {
            control.status = SessionStatus::Ended;
            control.current_post = None;
            control.post_start_at = None;
            self.store.save_control(&control)?;

            self.cancel_timer();
            info!("all posts completed, voting session ended");
            self.notifier.send(Event::VotingStatus {
                status: SessionStatus::Ended,
            });
            self.notifier.send(Event::SessionEnded);
        } else {
            let post = posts[next as usize].name.clone();
            control.current_post = Some(post.clone());
            control.current_post_index = next;
            control.post_start_at = Some(Utc::now());
            self.store.save_control(&control)?;

            info!("moved to next post: {post}");
            self.notifier.send(Event::ShowPost {
                post: post.clone(),
                remaining_time: self.window_secs,
            });
            self.restart_timer(post);
        }

        Ok(control)
    }

    /// Replaces the active countdown. Aborting the previous task before
    /// spawning the next one is what keeps a double-advance race impossible;
    /// the staleness check inside the tick loop is the backstop.
    fn restart_timer(self: &Arc<Self>, post: String) {
        let mut slot = self.timer.lock().expect("timer mutex poisoned");
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let controller = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            controller.run_timer(post).await;
        }));
    }

    fn cancel_timer(&self) {
        let mut slot = self.timer.lock().expect("timer mutex poisoned");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    async fn run_timer(self: Arc<Self>, post: String) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The transition that started this timer already broadcast the
        // opening showPost; skip the interval's immediate first tick.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let control = match self.store.get_control() {
                Ok(control) => control,
                Err(e) => {
                    // Transient storage trouble: skip this tick, try the next.
                    warn!("timer tick could not read session state: {e}");
                    continue;
                }
            };

            // Superseded by a manual advance or an end.
            if control.status != SessionStatus::InProgress
                || control.current_post.as_deref() != Some(post.as_str())
            {
                return;
            }

            let Some(started) = control.post_start_at else {
                return;
            };

            let remaining = self.remaining_from(started);
            if remaining > 0 {
                self.notifier.send(Event::ShowPost {
                    post: post.clone(),
                    remaining_time: remaining,
                });
            } else {
                self.advance_from_timer(&post).await;
                return;
            }
        }
    }

    /// Window expired: advance, unless someone else already moved the
    /// session while this tick was in flight.
    async fn advance_from_timer(self: &Arc<Self>, expected: &str) {
        let _guard = self.transitions.lock().await;

        let control = match self.store.get_control() {
            Ok(control) => control,
            Err(e) => {
                warn!("timer advance could not read session state: {e}");
                return;
            }
        };
        if control.status != SessionStatus::InProgress
            || control.current_post.as_deref() != Some(expected)
        {
            return;
        }

        // Still the active timer, so the stored handle is this task's own.
        // Detach it so advance_locked's restart does not abort the task
        // running this very code.
        drop(self.timer.lock().expect("timer mutex poisoned").take());

        let posts = match self.store.posts() {
            Ok(posts) => posts,
            Err(e) => {
                warn!("timer advance could not load posts: {e}");
                return;
            }
        };

        if let Err(e) = self.advance_locked(control, &posts) {
            warn!("timer advance failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Store, realtime::Notifier};

    fn controller(store: Store) -> Arc<SessionController> {
        SessionController::new(store, Notifier::new(16), 60)
    }

    #[tokio::test]
    async fn test_start_without_posts_is_config_error() {
        let store = Store::open_in_memory().unwrap();
        let controller = controller(store.clone());

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        // SessionControl untouched by the failed start.
        let control = store.get_control().unwrap();
        assert_eq!(control.status, SessionStatus::NotStarted);
        assert!(control.current_post.is_none());
    }

    #[tokio::test]
    async fn test_start_opens_first_post() {
        let store = Store::open_in_memory().unwrap();
        store.seed_posts().unwrap();
        let controller = controller(store.clone());

        let control = controller.start().await.unwrap();
        assert_eq!(control.status, SessionStatus::InProgress);
        assert_eq!(control.current_post.as_deref(), Some("President"));
        assert_eq!(control.current_post_index, 0);
        assert!(control.post_start_at.is_some());

        controller.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.seed_posts().unwrap();
        let controller = controller(store);

        controller.start().await.unwrap();
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AppError::VotingClosed(_)));

        controller.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_advance_outside_session_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.seed_posts().unwrap();
        let controller = controller(store);

        let err = controller.advance().await.unwrap_err();
        assert!(matches!(err, AppError::VotingClosed(_)));

        // Also rejected once ended (forced end is valid from any state).
        controller.end().await.unwrap();
        let err = controller.advance().await.unwrap_err();
        assert!(matches!(err, AppError::VotingClosed(_)));
    }

    #[tokio::test]
    async fn test_restart_after_end() {
        let store = Store::open_in_memory().unwrap();
        store.seed_posts().unwrap();
        let controller = controller(store);

        controller.start().await.unwrap();
        controller.end().await.unwrap();

        let control = controller.start().await.unwrap();
        assert_eq!(control.status, SessionStatus::InProgress);
        assert_eq!(control.current_post_index, 0);

        controller.end().await.unwrap();
    }
}
