//! Moderation action types
//!
//! The payload every action carries, and the executor boundary the word
//! filter and manual commands call into.

use crate::moderation::{ActionLog, ModerationResult};
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of moderation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum ActionKind {
    /// Formal warning, nothing happens on Discord besides the DM
    #[display("warning")]
    Warning,
    /// Remove from the guild
    #[display("kick")]
    Kick,
    /// Apply the guild's muted role
    #[display("mute")]
    Mute,
    /// Ban with message purge, then unban
    #[display("softban")]
    SoftBan,
    /// Server ban
    #[display("ban")]
    Ban,
}

impl ActionKind {
    /// Whether this kind of action can be undone after a duration
    #[must_use]
    pub const fn is_reversible(self) -> bool {
        matches!(self, Self::Mute | Self::Ban)
    }
}

/// Minimum payload for executing an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub guild_id: GuildId,
    /// Member the action is applied to
    pub subject_id: UserId,
    /// Channel the action originated from
    pub channel_id: ChannelId,
    /// Moderator, or the bot's own id for automated actions
    pub actor_id: UserId,
    pub reason: Option<String>,
    /// Timed actions are reversed after this long
    pub duration: Option<Duration>,
    /// Role applied by a mute
    pub role_id: Option<RoleId>,
    /// Id of an earlier action this one refers to
    pub reference: Option<u64>,
}

impl ActionPayload {
    #[must_use]
    pub const fn new(guild_id: GuildId, subject_id: UserId, channel_id: ChannelId, actor_id: UserId) -> Self {
        Self {
            guild_id,
            subject_id,
            channel_id,
            actor_id,
            reason: None,
            duration: None,
            role_id: None,
            reference: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub const fn with_role(mut self, role_id: RoleId) -> Self {
        self.role_id = Some(role_id);
        self
    }

    #[must_use]
    pub const fn with_reference(mut self, reference: Option<u64>) -> Self {
        self.reference = reference;
        self
    }

    /// Duration, ignoring zero
    #[must_use]
    pub fn timed(&self) -> Option<Duration> {
        self.duration.filter(|d| !d.is_zero())
    }
}

/// Whether the subject is told about the action by direct message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmOptions {
    pub send: bool,
}

/// Performs moderation actions against Discord and records them
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    /// # Errors
    /// Returns an error if the action could not be recorded or applied.
    async fn warn(&self, payload: ActionPayload, dm: DmOptions) -> ModerationResult<ActionLog>;

    /// # Errors
    /// Returns an error if the member could not be kicked.
    async fn kick(&self, payload: ActionPayload, dm: DmOptions) -> ModerationResult<ActionLog>;

    /// # Errors
    /// Returns an error if the payload has no role or the role could not be applied.
    async fn mute(&self, payload: ActionPayload, dm: DmOptions) -> ModerationResult<ActionLog>;

    /// Ban, purging `purge_days` of messages, then unban straight away.
    ///
    /// # Errors
    /// Returns an error if either the ban or the unban failed.
    async fn softban(&self, payload: ActionPayload, purge_days: u8, dm: DmOptions) -> ModerationResult<ActionLog>;

    /// # Errors
    /// Returns an error if the member could not be banned.
    async fn ban(&self, payload: ActionPayload, purge_days: u8, dm: DmOptions) -> ModerationResult<ActionLog>;
}
