//! Action log store
//!
//! In-memory map of every moderation action taken since startup.

use crate::moderation::{ActionLog, ActionState, ModerationError, ModerationResult};
use dashmap::DashMap;
use poise::serenity_prelude::{GuildId, UserId};
use std::sync::Arc;

/// Store for action logs
#[derive(Clone, Default)]
pub struct ActionLogStore {
    logs: Arc<DashMap<String, ActionLog>>,
}

impl ActionLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, log: ActionLog) {
        self.logs.insert(log.id.clone(), log);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ActionLog> {
        self.logs.get(id).map(|log| log.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Ids of active logs whose reversal time has passed
    #[must_use]
    pub fn due_for_reversal(&self) -> Vec<String> {
        self.logs
            .iter()
            .filter(|entry| entry.value().is_due_for_reversal())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Every log for a member of a guild
    #[must_use]
    pub fn for_subject(&self, guild_id: GuildId, subject_id: UserId) -> Vec<ActionLog> {
        self.logs
            .iter()
            .filter(|entry| {
                let log = entry.value();
                log.payload.guild_id == guild_id && log.payload.subject_id == subject_id
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    #[must_use]
    pub fn by_state(&self, state: ActionState) -> Vec<ActionLog> {
        self.logs
            .iter()
            .filter(|entry| entry.value().state == state)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Apply `update` to the log with `id` and return the updated copy.
    ///
    /// # Errors
    /// Returns an error if there is no such log or `update` fails.
    pub fn update<F>(&self, id: &str, update: F) -> ModerationResult<ActionLog>
    where
        F: FnOnce(&mut ActionLog) -> ModerationResult<()>,
    {
        let mut log = self
            .logs
            .get_mut(id)
            .ok_or_else(|| ModerationError::NotFound(id.to_string()))?;
        update(&mut log)?;
        Ok(log.clone())
    }
}
