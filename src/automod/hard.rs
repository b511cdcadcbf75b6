//! Hard punishments
//!
//! Each word entry names at most one escalation. Every escalation except a
//! warning first claims its dedupe key(s); a held key or an unreachable
//! store skips the escalation without producing an action log.

use crate::automod::filter::IncomingMessage;
use crate::automod::lock::{ClaimRejected, DedupeKey, DedupeKind, LockStore, claim};
use crate::automod::metrics::AutomodMetrics;
use crate::automod::settings::{AutomodSettings, WordEntry};
use crate::moderation::{
    ActionExecutor, ActionLog, ActionPayload, DmOptions, ModerationError, ModerationResult,
};
use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reason attached to every automated escalation
pub const AUTOMOD_WORD_REASON: &str = "Automod: message contained a filtered word";

/// Days of messages purged by automated bans
const PURGE_DAYS: u8 = 1;

/// Escalation configured on a word entry
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum HardPunishment {
    #[default]
    #[display("none")]
    None,
    #[display("warning")]
    Warning,
    #[display("kick")]
    Kick,
    #[display("mute")]
    Mute,
    #[display("softban")]
    SoftBan,
    #[display("ban")]
    Ban,
}

impl TryFrom<u8> for HardPunishment {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Warning),
            2 => Ok(Self::Kick),
            3 => Ok(Self::Mute),
            4 => Ok(Self::SoftBan),
            5 => Ok(Self::Ban),
            other => Err(other),
        }
    }
}

impl HardPunishment {
    /// Dedupe keys claimed before this escalation, in claim order
    #[must_use]
    pub const fn dedupe_kinds(self) -> &'static [DedupeKind] {
        match self {
            Self::None | Self::Warning => &[],
            Self::Kick => &[DedupeKind::Kick],
            Self::Mute => &[DedupeKind::Mute],
            Self::SoftBan => &[DedupeKind::Ban, DedupeKind::Unban],
            Self::Ban => &[DedupeKind::Ban],
        }
    }
}

/// What the dispatcher did for one match
#[derive(Debug, Clone, PartialEq)]
pub enum HardOutcome {
    NotConfigured,
    Executed(ActionLog),
    /// A concurrent escalation holds this key
    LockHeld(DedupeKind),
    /// The lock store failed, so the escalation was skipped
    LockUnavailable(DedupeKind),
    /// Mute configured but the guild has no muted role
    NoMuteRole,
    /// The executor rejected the action; never retried
    Failed(HardPunishment),
}

/// Turns a matched word's escalation into at most one executor call
#[derive(Clone)]
pub struct HardPunishmentDispatcher {
    executor: Arc<dyn ActionExecutor>,
    locks: Arc<dyn LockStore>,
    system_actor: UserId,
    lock_ttl: Duration,
    metrics: Arc<AutomodMetrics>,
}

impl HardPunishmentDispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        locks: Arc<dyn LockStore>,
        system_actor: UserId,
        lock_ttl: Duration,
        metrics: Arc<AutomodMetrics>,
    ) -> Self {
        Self {
            executor,
            locks,
            system_actor,
            lock_ttl,
            metrics,
        }
    }

    pub async fn dispatch(&self, msg: &IncomingMessage, entry: &WordEntry, settings: &AutomodSettings) -> HardOutcome {
        let punishment = entry.hard_punish;
        if punishment == HardPunishment::None {
            return HardOutcome::NotConfigured;
        }

        let mut payload = ActionPayload::new(msg.guild_id, msg.author_id, msg.channel_id, self.system_actor)
            .with_reason(AUTOMOD_WORD_REASON)
            .with_reference(Some(msg.message_id.get()));

        if punishment == HardPunishment::Mute {
            let Some(role_id) = settings.muted_role_id else {
                debug!(guild_id = %msg.guild_id, "Mute configured but no muted role, skipping");
                return HardOutcome::NoMuteRole;
            };
            payload = payload.with_role(role_id);
        }

        let keys: Vec<DedupeKey> = punishment
            .dedupe_kinds()
            .iter()
            .map(|kind| DedupeKey::new(msg.guild_id, *kind, msg.author_id))
            .collect();
        match claim(self.locks.as_ref(), &keys, self.lock_ttl).await {
            Ok(()) => {}
            Err(ClaimRejected::Held(key)) => {
                self.metrics.record_lock_contended(&key);
                return HardOutcome::LockHeld(key.kind);
            }
            Err(ClaimRejected::Unavailable(key, e)) => {
                self.metrics.record_lock_store_failure(&key, &e);
                return HardOutcome::LockUnavailable(key.kind);
            }
        }

        let dm = DmOptions {
            send: settings.dm_on_violation,
        };
        match self.execute(punishment, payload, entry.duration(), dm).await {
            Ok(log) => {
                self.metrics.record_hard_executed(&punishment, &log.id);
                HardOutcome::Executed(log)
            }
            Err(e) => {
                self.metrics.record_hard_failure(&punishment, &e);
                HardOutcome::Failed(punishment)
            }
        }
    }

    async fn execute(
        &self,
        punishment: HardPunishment,
        payload: ActionPayload,
        duration: Option<Duration>,
        dm: DmOptions,
    ) -> ModerationResult<ActionLog> {
        match punishment {
            HardPunishment::Warning => self.executor.warn(payload, dm).await,
            HardPunishment::Kick => self.executor.kick(payload, dm).await,
            HardPunishment::Mute => self.executor.mute(payload.with_duration(duration), dm).await,
            HardPunishment::SoftBan => self.executor.softban(payload, PURGE_DAYS, dm).await,
            HardPunishment::Ban => {
                self.executor
                    .ban(payload.with_duration(duration), PURGE_DAYS, dm)
                    .await
            }
            HardPunishment::None => Err(ModerationError::ValidationFailed(
                "No hard punishment configured".to_string(),
            )),
        }
    }
}
