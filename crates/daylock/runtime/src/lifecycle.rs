//! Application foreground/background transitions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTransition {
    pub from: AppState,
    pub to: AppState,
}

impl LifecycleTransition {
    /// Returning to the foreground from any other state.
    pub fn is_foreground_return(&self) -> bool {
        self.from != AppState::Active && self.to == AppState::Active
    }
}

/// Publishes app state transitions to any number of listeners.
#[derive(Debug)]
pub struct AppLifecycle {
    state: Mutex<AppState>,
    tx: broadcast::Sender<LifecycleTransition>,
}

impl AppLifecycle {
    pub fn new(initial: AppState) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(initial),
            tx,
        }
    }

    pub fn state(&self) -> AppState {
        *self.state.lock()
    }

    /// Record a new state. Publishes only when the state actually changes.
    pub fn set_state(&self, to: AppState) {
        let from = {
            let mut state = self.state.lock();
            if *state == to {
                return;
            }
            std::mem::replace(&mut *state, to)
        };
        debug!(?from, ?to, "app state changed");
        // No listeners is fine.
        let _ = self.tx.send(LifecycleTransition { from, to });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.tx.subscribe()
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new(AppState::Active)
    }
}
