use std::sync::Arc;

use crate::{
    auth::Sessions, config::Config, db::Store, realtime::Notifier, session::SessionController,
};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub notifier: Notifier,
    pub sessions: Sessions,
    pub controller: Arc<SessionController>,
}

impl AppState {
    pub fn new() -> SharedState {
        Self::with_config(Config::load())
    }

    pub fn with_config(config: Config) -> SharedState {
        let store = Store::open(&config.database_path).expect("Database misconfigured!");
        let notifier = Notifier::new(128);
        let controller =
            SessionController::new(store.clone(), notifier.clone(), config.vote_window_secs);

        Arc::new(AppState {
            sessions: Sessions::new(config.token_ttl_hours),
            store,
            notifier,
            controller,
            config,
        })
    }
}
