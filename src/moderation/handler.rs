//! Moderation action handlers
//!
//! One handler per [`ActionKind`], each knowing how to apply and undo its
//! action through the Discord HTTP API.

use crate::moderation::{ActionKind, ActionPayload, ModerationError, ModerationResult};
use poise::serenity_prelude::Http;
use std::collections::HashMap;
use tracing::info;

/// Audit log reason used when the payload carries none
const DEFAULT_REASON: &str = "Moderation action";

/// Trait for handling moderation actions
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    /// Apply the action
    async fn execute(&self, http: &Http, payload: &ActionPayload, purge_days: u8) -> ModerationResult<()>;

    /// Undo the action, for kinds that can be undone
    async fn reverse(&self, http: &Http, payload: &ActionPayload) -> ModerationResult<()>;
}

/// Registry of action handlers
pub struct ActionHandlerRegistry {
    handlers: HashMap<ActionKind, Box<dyn ActionHandler>>,
}

impl Default for ActionHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandlerRegistry {
    /// Create a registry with the Discord handlers registered
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(ActionKind::Warning, Box::new(WarningHandler));
        registry.register(ActionKind::Kick, Box::new(KickHandler));
        registry.register(ActionKind::Mute, Box::new(MuteHandler));
        registry.register(ActionKind::SoftBan, Box::new(SoftBanHandler));
        registry.register(ActionKind::Ban, Box::new(BanHandler));
        registry
    }

    /// Create a registry with nothing registered
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: ActionKind, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    fn get(&self, kind: ActionKind) -> ModerationResult<&dyn ActionHandler> {
        self.handlers
            .get(&kind)
            .map(AsRef::as_ref)
            .ok_or_else(|| ModerationError::ValidationFailed(format!("No handler registered for {kind}")))
    }

    /// Execute an action
    ///
    /// # Errors
    /// Returns an error if no handler is registered or the handler fails.
    pub async fn execute(
        &self,
        http: &Http,
        kind: ActionKind,
        payload: &ActionPayload,
        purge_days: u8,
    ) -> ModerationResult<()> {
        self.get(kind)?.execute(http, payload, purge_days).await
    }

    /// Reverse an action
    ///
    /// # Errors
    /// Returns an error if no handler is registered or the handler fails.
    pub async fn reverse(&self, http: &Http, kind: ActionKind, payload: &ActionPayload) -> ModerationResult<()> {
        self.get(kind)?.reverse(http, payload).await
    }
}

fn reason(payload: &ActionPayload) -> &str {
    payload.reason.as_deref().unwrap_or(DEFAULT_REASON)
}

/// Warnings only exist in the action log and the subject's DMs
struct WarningHandler;

#[async_trait::async_trait]
impl ActionHandler for WarningHandler {
    async fn execute(&self, _http: &Http, payload: &ActionPayload, _purge_days: u8) -> ModerationResult<()> {
        info!(
            "Warned user {} in guild {}",
            payload.subject_id, payload.guild_id
        );
        Ok(())
    }

    async fn reverse(&self, _http: &Http, _payload: &ActionPayload) -> ModerationResult<()> {
        Ok(())
    }
}

struct KickHandler;

#[async_trait::async_trait]
impl ActionHandler for KickHandler {
    async fn execute(&self, http: &Http, payload: &ActionPayload, _purge_days: u8) -> ModerationResult<()> {
        info!(
            "Kicking user {} from guild {}",
            payload.subject_id, payload.guild_id
        );
        payload
            .guild_id
            .kick_with_reason(http, payload.subject_id, reason(payload))
            .await?;
        Ok(())
    }

    async fn reverse(&self, _http: &Http, payload: &ActionPayload) -> ModerationResult<()> {
        info!(
            "Kick doesn't need reversal for user {} in guild {}",
            payload.subject_id, payload.guild_id
        );
        Ok(())
    }
}

/// Mutes apply the guild's configured muted role
struct MuteHandler;

#[async_trait::async_trait]
impl ActionHandler for MuteHandler {
    async fn execute(&self, http: &Http, payload: &ActionPayload, _purge_days: u8) -> ModerationResult<()> {
        let role_id = payload
            .role_id
            .ok_or_else(|| ModerationError::ValidationFailed("Mute requires a role".to_string()))?;
        info!(
            "Muting user {} in guild {} for {:?}",
            payload.subject_id,
            payload.guild_id,
            payload.timed()
        );
        http.add_member_role(payload.guild_id, payload.subject_id, role_id, Some(reason(payload)))
            .await?;
        Ok(())
    }

    async fn reverse(&self, http: &Http, payload: &ActionPayload) -> ModerationResult<()> {
        let role_id = payload
            .role_id
            .ok_or_else(|| ModerationError::ValidationFailed("Mute requires a role".to_string()))?;
        info!(
            "Unmuting user {} in guild {}",
            payload.subject_id, payload.guild_id
        );
        http.remove_member_role(payload.guild_id, payload.subject_id, role_id, Some("Mute expired"))
            .await?;
        Ok(())
    }
}

/// Ban to purge recent messages, then lift the ban straight away
struct SoftBanHandler;

#[async_trait::async_trait]
impl ActionHandler for SoftBanHandler {
    async fn execute(&self, http: &Http, payload: &ActionPayload, purge_days: u8) -> ModerationResult<()> {
        info!(
            "Softbanning user {} in guild {}",
            payload.subject_id, payload.guild_id
        );
        payload
            .guild_id
            .ban_with_reason(http, payload.subject_id, purge_days, reason(payload))
            .await?;
        payload.guild_id.unban(http, payload.subject_id).await?;
        Ok(())
    }

    async fn reverse(&self, _http: &Http, _payload: &ActionPayload) -> ModerationResult<()> {
        Ok(())
    }
}

struct BanHandler;

#[async_trait::async_trait]
impl ActionHandler for BanHandler {
    async fn execute(&self, http: &Http, payload: &ActionPayload, purge_days: u8) -> ModerationResult<()> {
        info!(
            "Banning user {} in guild {} for {:?}",
            payload.subject_id,
            payload.guild_id,
            payload.timed()
        );
        payload
            .guild_id
            .ban_with_reason(http, payload.subject_id, purge_days, reason(payload))
            .await?;
        Ok(())
    }

    async fn reverse(&self, http: &Http, payload: &ActionPayload) -> ModerationResult<()> {
        info!(
            "Unbanning user {} in guild {}",
            payload.subject_id, payload.guild_id
        );
        payload.guild_id.unban(http, payload.subject_id).await?;
        Ok(())
    }
}
