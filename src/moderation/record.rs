//! Action log entries and their lifecycle
//!
//! Every executed moderation action is recorded as an [`ActionLog`]. Timed
//! mutes and bans stay `Active` until their reversal runs.

use crate::moderation::{ActionKind, ActionPayload, ModerationError, ModerationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Action log lifecycle states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum ActionState {
    /// Recorded, not yet applied
    #[default]
    Pending,
    /// Applied and waiting for its duration to expire
    Active,
    /// Timed action has been undone
    Reversed,
    /// Applied with no further work needed
    Completed,
    /// Discord rejected the action
    Failed,
}

/// Record of one moderation action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub id: String,
    pub kind: ActionKind,
    pub payload: ActionPayload,
    pub state: ActionState,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    /// When a timed action is due to be undone
    pub reverse_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
    /// Last error, for failed entries
    pub error: Option<String>,
}

impl ActionLog {
    #[must_use]
    pub fn new(kind: ActionKind, payload: ActionPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            state: ActionState::Pending,
            created_at: Utc::now(),
            executed_at: None,
            reverse_at: None,
            reversed_at: None,
            error: None,
        }
    }

    /// Whether this action has to be undone later
    #[must_use]
    pub fn needs_reversal(&self) -> bool {
        self.kind.is_reversible() && self.payload.timed().is_some()
    }

    fn calculate_reversal_time(&self) -> ModerationResult<Option<DateTime<Utc>>> {
        let Some(timed) = self.payload.timed().filter(|_| self.kind.is_reversible()) else {
            return Ok(None);
        };
        chrono::Duration::from_std(timed)
            .ok()
            .and_then(|duration| Utc::now().checked_add_signed(duration))
            .map(Some)
            .ok_or_else(|| {
                ModerationError::ValidationFailed(format!("duration of {}s is out of range", timed.as_secs()))
            })
    }

    /// Check the action can be recorded before anything is applied
    ///
    /// # Errors
    /// Returns [`ModerationError::ValidationFailed`] if the reversal time
    /// cannot be represented
    pub fn validate(&self) -> ModerationResult<()> {
        self.calculate_reversal_time().map(|_| ())
    }

    /// Mark as applied, transitioning to Active or Completed
    ///
    /// # Errors
    /// Returns an error if the log is not Pending
    pub fn execute(&mut self) -> ModerationResult<()> {
        if self.state != ActionState::Pending {
            return Err(ModerationError::InvalidStateTransition);
        }

        self.reverse_at = self.calculate_reversal_time()?;
        self.state = if self.reverse_at.is_some() {
            ActionState::Active
        } else {
            ActionState::Completed
        };
        self.executed_at = Some(Utc::now());

        info!(
            log_id = %self.id,
            kind = %self.kind,
            guild_id = %self.payload.guild_id,
            subject_id = %self.payload.subject_id,
            reverse_at = ?self.reverse_at,
            "Moderation action executed"
        );

        Ok(())
    }

    /// Mark as undone
    ///
    /// # Errors
    /// Returns an error if the log is not Active
    pub fn reverse(&mut self) -> ModerationResult<()> {
        if self.state != ActionState::Active {
            return Err(ModerationError::InvalidStateTransition);
        }

        self.state = ActionState::Reversed;
        self.reversed_at = Some(Utc::now());

        info!(
            log_id = %self.id,
            kind = %self.kind,
            guild_id = %self.payload.guild_id,
            subject_id = %self.payload.subject_id,
            "Moderation action reversed"
        );

        Ok(())
    }

    /// Mark as failed. Only Pending logs can fail; a failed reversal keeps
    /// the log Active so the next check retries it.
    ///
    /// # Errors
    /// Returns an error if the log is not Pending
    pub fn fail(&mut self, error: impl Into<String>) -> ModerationResult<()> {
        if self.state != ActionState::Pending {
            return Err(ModerationError::InvalidStateTransition);
        }
        self.state = ActionState::Failed;
        self.error = Some(error.into());
        Ok(())
    }

    #[must_use]
    pub fn is_due_for_reversal(&self) -> bool {
        self.state == ActionState::Active
            && self
                .reverse_at
                .is_some_and(|reverse_at| reverse_at <= Utc::now())
    }
}
