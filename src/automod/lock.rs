//! Dedupe lock store
//!
//! Short-lived presence-only keys that stop two escalations of the same kind
//! against the same member from running at once. Keys are never released
//! explicitly; expiry is the only way a key becomes free again. Manual
//! moderation commands claim keys from the same namespace.

use crate::automod::error::LockStoreError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Escalation kind a dedupe key guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum DedupeKind {
    #[display("ban")]
    Ban,
    #[display("unban")]
    Unban,
    #[display("kick")]
    Kick,
    #[display("mute")]
    Mute,
}

/// Composite key of guild, escalation kind and subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub guild_id: GuildId,
    pub kind: DedupeKind,
    pub subject_id: UserId,
}

impl DedupeKey {
    #[must_use]
    pub const fn new(guild_id: GuildId, kind: DedupeKind, subject_id: UserId) -> Self {
        Self {
            guild_id,
            kind,
            subject_id,
        }
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "community:{}:{}:{}",
            self.guild_id, self.kind, self.subject_id
        )
    }
}

/// Result of a check-and-set on a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Key was free and is now held until the TTL elapses
    Acquired,
    /// Someone else holds the key
    AlreadyHeld,
}

/// Atomic check-and-set store for dedupe keys
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` with `ttl` if and only if it is not currently held.
    ///
    /// # Errors
    /// Returns an error when the store cannot answer; callers must not treat
    /// that as [`LockOutcome::Acquired`].
    async fn try_acquire(&self, key: &DedupeKey, ttl: Duration) -> Result<LockOutcome, LockStoreError>;
}

/// Why a claim on a set of keys was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRejected {
    /// The key is held by a concurrent escalation
    Held(DedupeKey),
    /// The store failed, so uniqueness cannot be proven
    Unavailable(DedupeKey, LockStoreError),
}

/// Claim every key in order, stopping at the first one that is refused.
///
/// Keys claimed before a refusal stay held until they expire.
///
/// # Errors
/// Returns the first refused key and why it was refused.
pub async fn claim(
    store: &dyn LockStore,
    keys: &[DedupeKey],
    ttl: Duration,
) -> Result<(), ClaimRejected> {
    for key in keys {
        match store.try_acquire(key, ttl).await {
            Ok(LockOutcome::Acquired) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Dedupe key acquired");
            }
            Ok(LockOutcome::AlreadyHeld) => return Err(ClaimRejected::Held(*key)),
            Err(e) => return Err(ClaimRejected::Unavailable(*key, e)),
        }
    }
    Ok(())
}

/// In-process lock store keyed by the rendered key string
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    entries: Arc<DashMap<String, Instant>>,
}

impl InMemoryLockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is held right now.
    #[must_use]
    pub fn is_held(&self, key: &DedupeKey) -> bool {
        self.entries
            .get(&key.to_string())
            .is_some_and(|expires_at| *expires_at > Instant::now())
    }

    /// Drop expired keys and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired keys in the background.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, "Purged expired dedupe keys");
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, key: &DedupeKey, ttl: Duration) -> Result<LockOutcome, LockStoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check and set are atomic.
        let outcome = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    LockOutcome::AlreadyHeld
                } else {
                    entry.insert(now + ttl);
                    LockOutcome::Acquired
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                LockOutcome::Acquired
            }
        };
        Ok(outcome)
    }
}
