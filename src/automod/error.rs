//! Error types for the word filter pipeline
//!
//! None of these ever escape the per-message task. They are logged, counted
//! and turned into a no-op by the component that hit them.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the match worker pool
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    /// No response within the caller's deadline
    #[error("Match worker timed out after {0:?}")]
    Timeout(Duration),

    /// Queue closed or the worker dropped the reply
    #[error("Match worker unavailable")]
    Unavailable,

    /// The compiled pattern could not be built into a matcher
    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(String),
}

/// Failures reading guild settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
}

/// Failures from the dedupe lock store, distinct from "already held"
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockStoreError {
    #[error("Lock store unreachable: {0}")]
    Unreachable(String),
}

/// Failures from message-level Discord calls made by soft punishments
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The message or channel is already gone
    #[error("Target not found")]
    NotFound,

    /// Missing permissions in the channel
    #[error("Missing permissions: {0}")]
    Forbidden(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    Api(String),
}

/// Umbrella error for the automod pipeline
#[derive(Debug, Error)]
pub enum AutomodError {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    LockStore(#[from] LockStoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Worker pool could not be started: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for automod operations
pub type AutomodResult<T> = Result<T, AutomodError>;
