//! Per-installation rehydration completion flags.
//!
//! A flag records that history was restored for a user on this install, so
//! later launches skip the probe. The install id is a random UUID created on
//! first use; a reinstall wipes it together with the flags, which is what
//! lets a fresh install probe again.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use daylock_storage::{get_json, set_json, KeyValueStore};
use daylock_types::Clock;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RehydrationConfig;
use crate::error::Result;

/// Identifier of this installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallId(String);

impl InstallId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Load the persisted id, creating and storing one on first use.
    pub async fn load_or_create(store: &dyn KeyValueStore, key: &str) -> Result<Self> {
        if let Some(existing) = get_json::<InstallId>(store, key).await? {
            return Ok(existing);
        }
        let fresh = Self::generate();
        set_json(store, key, &fresh).await?;
        info!(install_id = %fresh, "created install id");
        Ok(fresh)
    }
}

impl std::fmt::Display for InstallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RehydrationFlag {
    pub install_id: InstallId,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    pub attempts_rehydrated: u64,
}

/// Encode a user id into key-safe characters. Injective: every byte outside
/// `[A-Za-z0-9.-]` becomes `_xx`.
fn key_segment(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "_{byte:02x}");
        }
    }
    out
}

pub struct RehydrationFlagStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    install_id_key: String,
    install_id: OnceCell<InstallId>,
}

impl RehydrationFlagStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &RehydrationConfig,
    ) -> Self {
        Self {
            store,
            clock,
            key_prefix: config.flag_key_prefix.clone(),
            install_id_key: config.install_id_key.clone(),
            install_id: OnceCell::new(),
        }
    }

    pub async fn install_id(&self) -> Result<InstallId> {
        self.install_id
            .get_or_try_init(|| {
                InstallId::load_or_create(self.store.as_ref(), &self.install_id_key)
            })
            .await
            .cloned()
    }

    async fn key(&self, user_id: &str) -> Result<String> {
        let install_id = self.install_id().await?;
        Ok(format!(
            "{}.{}.{}",
            self.key_prefix,
            install_id,
            key_segment(user_id)
        ))
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<RehydrationFlag>> {
        let key = self.key(user_id).await?;
        Ok(get_json(self.store.as_ref(), &key).await?)
    }

    pub async fn is_complete(&self, user_id: &str) -> Result<bool> {
        Ok(self.get(user_id).await?.is_some())
    }

    pub async fn mark_complete(
        &self,
        user_id: &str,
        attempts_rehydrated: u64,
    ) -> Result<RehydrationFlag> {
        let key = self.key(user_id).await?;
        let flag = RehydrationFlag {
            install_id: self.install_id().await?,
            user_id: user_id.to_string(),
            completed_at: self.clock.now(),
            attempts_rehydrated,
        };
        set_json(self.store.as_ref(), &key, &flag).await?;
        debug!(%key, attempts_rehydrated, "rehydration flag written");
        Ok(flag)
    }

    pub async fn clear(&self, user_id: &str) -> Result<()> {
        let key = self.key(user_id).await?;
        Ok(self.store.remove(&key).await?)
    }
}

impl std::fmt::Debug for RehydrationFlagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RehydrationFlagStore")
            .field("key_prefix", &self.key_prefix)
            .field("install_id", &self.install_id.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use daylock_storage::InMemoryKeyValueStore;
    use daylock_types::ManualClock;

    fn flags(kv: Arc<InMemoryKeyValueStore>) -> RehydrationFlagStore {
        let clock = Arc::new(ManualClock::utc(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        ));
        RehydrationFlagStore::new(kv, clock, &RehydrationConfig::default())
    }

    #[test]
    fn key_segment_is_key_safe_and_injective() {
        assert_eq!(key_segment("user-42"), "user-42");
        assert_eq!(key_segment("a@b.com"), "a_40b.com");
        assert_ne!(key_segment("a_b"), key_segment("a/b"));
        assert!(key_segment("ü/ß x")
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    }

    #[tokio::test]
    async fn install_id_is_created_once_and_persisted() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let first = flags(kv.clone()).install_id().await.unwrap();
        let second = flags(kv.clone()).install_id().await.unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(first.as_str()).is_ok());
    }

    #[tokio::test]
    async fn mark_clear_round() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = flags(kv.clone());
        assert!(!store.is_complete("user-1").await.unwrap());

        let flag = store.mark_complete("user-1", 3).await.unwrap();
        assert_eq!(flag.attempts_rehydrated, 3);
        assert!(store.is_complete("user-1").await.unwrap());
        assert!(!store.is_complete("user-2").await.unwrap());

        let key = format!("daylock.rehydrated.{}.user-1", flag.install_id);
        assert!(kv.get(&key).await.unwrap().is_some());

        store.clear("user-1").await.unwrap();
        assert!(!store.is_complete("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn new_install_does_not_see_old_flags() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        flags(kv.clone()).mark_complete("user-1", 1).await.unwrap();

        kv.remove("daylock.install_id").await.unwrap();
        assert!(!flags(kv).is_complete("user-1").await.unwrap());
    }
}
