//! Word policy entries and the per-guild settings snapshot the filter reads

use crate::automod::error::SettingsError;
use crate::automod::hard::HardPunishment;
use crate::automod::pattern::CompiledPattern;
use crate::automod::soft::ModerationFlags;
use poise::serenity_prelude::{GuildId, RoleId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One configured forbidden word and what happens when it is matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    /// Canonical (normalized) word, unique within a guild
    pub word: String,
    /// Immediate responses
    #[serde(default)]
    pub soft_punish: ModerationFlags,
    /// Escalation
    #[serde(default)]
    pub hard_punish: HardPunishment,
    /// Seconds, only meaningful for `Mute` and `Ban`
    #[serde(default)]
    pub hard_punish_duration: Option<u64>,
}

impl WordEntry {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            soft_punish: ModerationFlags::empty(),
            hard_punish: HardPunishment::None,
            hard_punish_duration: None,
        }
    }

    #[must_use]
    pub fn with_soft(mut self, flags: ModerationFlags) -> Self {
        self.soft_punish = flags;
        self
    }

    #[must_use]
    pub fn with_hard(mut self, punishment: HardPunishment, duration: Option<Duration>) -> Self {
        self.hard_punish = punishment;
        self.hard_punish_duration = duration.map(|d| d.as_secs());
        self
    }

    /// Duration for timed escalations; `None` means permanent.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.hard_punish_duration
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Read-only view of a guild's automod settings for one message
#[derive(Debug, Clone)]
pub struct AutomodSettings {
    /// `None` means the word filter is disabled for the guild
    pub pattern: Option<CompiledPattern>,
    pub words: Arc<[WordEntry]>,
    /// Whether punished members are told by direct message
    pub dm_on_violation: bool,
    pub muted_role_id: Option<RoleId>,
}

impl AutomodSettings {
    /// Settings of a guild that never configured the filter.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            pattern: None,
            words: Arc::from(Vec::new()),
            dm_on_violation: false,
            muted_role_id: None,
        }
    }
}

/// Source of per-guild settings snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SettingsSource: Send + Sync {
    /// # Errors
    /// Returns an error when the settings store cannot be read.
    async fn acquire(&self, guild_id: GuildId) -> Result<AutomodSettings, SettingsError>;
}
