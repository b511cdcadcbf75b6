//! Moderator-issued actions
//!
//! Manual actions claim dedupe keys from the same namespace as the word
//! filter, so a moderator's ban and an automated ban of the same member
//! never both run.

use crate::automod::lock::{ClaimRejected, DedupeKey, DedupeKind, LockStore, claim};
use crate::moderation::{ActionExecutor, ActionLog, ActionPayload, DmOptions, ModerationError};
use std::time::Duration;
use thiserror::Error;

/// Why a manual action did not run
#[derive(Debug, Error)]
pub enum ManualActionError {
    #[error("An action against this member is already in progress")]
    InProgress,

    #[error("Could not check for concurrent actions, try again")]
    LockUnavailable,

    #[error(transparent)]
    Moderation(#[from] ModerationError),
}

impl From<ClaimRejected> for ManualActionError {
    fn from(rejected: ClaimRejected) -> Self {
        match rejected {
            ClaimRejected::Held(_) => Self::InProgress,
            ClaimRejected::Unavailable(..) => Self::LockUnavailable,
        }
    }
}

/// Ban a member on behalf of a moderator.
///
/// # Errors
/// Returns an error if the ban key is held or unverifiable, or the ban failed.
pub async fn manual_ban(
    executor: &dyn ActionExecutor,
    locks: &dyn LockStore,
    lock_ttl: Duration,
    payload: ActionPayload,
    purge_days: u8,
    dm: DmOptions,
) -> Result<ActionLog, ManualActionError> {
    let key = DedupeKey::new(payload.guild_id, DedupeKind::Ban, payload.subject_id);
    claim(locks, &[key], lock_ttl).await?;
    Ok(executor.ban(payload, purge_days, dm).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automod::lock::InMemoryLockStore;
    use crate::moderation::{ActionKind, MockActionExecutor};
    use poise::serenity_prelude::{ChannelId, GuildId, UserId};

    fn payload() -> ActionPayload {
        ActionPayload::new(GuildId::new(1), UserId::new(2), ChannelId::new(3), UserId::new(4))
    }

    #[tokio::test]
    async fn test_manual_ban_skips_when_automod_holds_key() {
        let locks = InMemoryLockStore::new();
        let ttl = Duration::from_secs(20);
        let key = DedupeKey::new(GuildId::new(1), DedupeKind::Ban, UserId::new(2));
        locks.try_acquire(&key, ttl).await.unwrap();

        let mut executor = MockActionExecutor::new();
        executor.expect_ban().never();

        let result = manual_ban(&executor, &locks, ttl, payload(), 1, DmOptions::default()).await;
        assert!(matches!(result, Err(ManualActionError::InProgress)));
    }

    #[tokio::test]
    async fn test_manual_ban_claims_key() {
        let locks = InMemoryLockStore::new();
        let ttl = Duration::from_secs(20);

        let mut executor = MockActionExecutor::new();
        executor
            .expect_ban()
            .times(1)
            .returning(|payload, _, _| Ok(ActionLog::new(ActionKind::Ban, payload)));

        let log = manual_ban(&executor, &locks, ttl, payload(), 1, DmOptions::default())
            .await
            .unwrap();
        assert_eq!(log.kind, ActionKind::Ban);
        assert!(locks.is_held(&DedupeKey::new(GuildId::new(1), DedupeKind::Ban, UserId::new(2))));
    }
}
