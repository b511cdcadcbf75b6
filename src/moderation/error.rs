//! Error types for the moderation action subsystem
//!
//! This module defines the errors that can occur while executing or reversing
//! a moderation action.

use thiserror::Error;

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Invalid state transition attempted
    #[error("Invalid state transition")]
    InvalidStateTransition,

    /// Action log not found
    #[error("Action log not found: {0}")]
    NotFound(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Failed to get guild or member
    #[error("Failed to get guild or member: {0}")]
    GuildOrMemberNotFound(String),

    /// Action validation failed
    #[error("Action validation failed: {0}")]
    ValidationFailed(String),

    /// Generic error
    #[error("Moderation error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for ModerationError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl From<String> for ModerationError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
