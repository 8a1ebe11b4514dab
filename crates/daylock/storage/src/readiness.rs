//! One-shot readiness signal for local stores.
//!
//! A store is created not-ready, performs its migrations, then calls
//! [`Readiness::mark_ready`]. Consumers await [`Readiness::wait`] instead of
//! polling.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, cloneable readiness flag. Once ready it stays ready.
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Readiness {
    /// Signal that starts out not ready.
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal that is already resolved.
    pub fn ready() -> Self {
        let readiness = Self::pending();
        readiness.mark_ready();
        readiness
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the store is ready. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_mark_ready() {
        let readiness = Readiness::pending();
        assert!(!readiness.is_ready());

        let waiter = readiness.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        readiness.mark_ready();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait should resolve")
            .unwrap();
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn ready_signal_does_not_block() {
        Readiness::ready().wait().await;
    }
}
