//! Moderation service
//!
//! Applies actions through the handler registry, keeps the action log and
//! runs the background task that undoes timed mutes and bans.

use crate::moderation::{
    ActionExecutor, ActionHandlerRegistry, ActionKind, ActionLog, ActionLogStore, ActionPayload,
    DmOptions, ModerationError, ModerationResult,
};
use poise::serenity_prelude::{CreateMessage, Http};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Request type for the reversal task
#[derive(Debug, Clone)]
pub enum ReversalCheck {
    /// Check every active log regardless of the interval
    CheckAll,
    Shutdown,
}

/// Handle to the running reversal task
pub struct ReversalTask {
    tx: Sender<ReversalCheck>,
    join: JoinHandle<()>,
}

impl ReversalTask {
    /// Ask the task for an out-of-band check.
    ///
    /// # Errors
    /// Returns an error if the task has stopped.
    pub async fn request(&self, request: ReversalCheck) -> ModerationResult<()> {
        self.tx
            .send(request)
            .await
            .map_err(|e| ModerationError::Other(format!("Reversal task is gone: {e}")))
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        if self.tx.send(ReversalCheck::Shutdown).await.is_err() {
            warn!("Reversal task already stopped");
        }
        if let Err(e) = self.join.await {
            error!("Reversal task panicked: {e}");
        }
    }
}

/// Service for moderation operations
#[derive(Clone)]
pub struct ModerationService {
    http: Arc<Http>,
    pub store: ActionLogStore,
    handlers: Arc<ActionHandlerRegistry>,
}

impl ModerationService {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self::with_handlers(http, ActionHandlerRegistry::new())
    }

    #[must_use]
    pub fn with_handlers(http: Arc<Http>, handlers: ActionHandlerRegistry) -> Self {
        Self {
            http,
            store: ActionLogStore::new(),
            handlers: Arc::new(handlers),
        }
    }

    /// Record, notify, apply.
    async fn run(
        &self,
        kind: ActionKind,
        payload: ActionPayload,
        purge_days: u8,
        dm: DmOptions,
    ) -> ModerationResult<ActionLog> {
        let log = ActionLog::new(kind, payload);
        log.validate()?;
        let id = log.id.clone();
        self.store.add(log.clone());

        // The subject can't be messaged once they share no guild with the bot.
        if dm.send {
            self.notify_subject(&log).await;
        }

        match self
            .handlers
            .execute(&self.http, kind, &log.payload, purge_days)
            .await
        {
            Ok(()) => self.store.update(&id, ActionLog::execute),
            Err(e) => {
                error!(log_id = %id, kind = %kind, "Failed to execute moderation action: {e}");
                if let Err(update) = self.store.update(&id, |log| log.fail(e.to_string())) {
                    warn!(log_id = %id, "Could not mark action as failed: {update}");
                }
                Err(e)
            }
        }
    }

    async fn notify_subject(&self, log: &ActionLog) {
        let content = subject_notice(log);
        let builder = CreateMessage::new().content(content);
        if let Err(e) = log
            .payload
            .subject_id
            .direct_message(&*self.http, builder)
            .await
        {
            debug!(
                subject_id = %log.payload.subject_id,
                "Could not DM subject about {}: {e}",
                log.kind
            );
        }
    }

    /// Undo every active log whose time is up. Failed reversals stay active
    /// and are retried on the next check.
    pub async fn check_reversals(&self) -> usize {
        let mut reversed = 0;
        for id in self.store.due_for_reversal() {
            if self.reverse_log(&id).await.is_ok() {
                reversed += 1;
            }
        }
        reversed
    }

    async fn reverse_log(&self, id: &str) -> ModerationResult<ActionLog> {
        let log = self
            .store
            .get(id)
            .ok_or_else(|| ModerationError::NotFound(id.to_string()))?;
        if !log.is_due_for_reversal() {
            return Ok(log);
        }

        if let Err(e) = self.handlers.reverse(&self.http, log.kind, &log.payload).await {
            error!(log_id = %id, kind = %log.kind, "Failed to reverse moderation action: {e}");
            return Err(e);
        }
        self.store.update(id, ActionLog::reverse)
    }

    /// Start the reversal task, checking every `every` and on request.
    #[must_use]
    pub fn start_reversal_task(&self, every: Duration) -> ReversalTask {
        let (tx, rx) = mpsc::channel(100);
        let service = self.clone();
        let join = tokio::spawn(async move { service.reversal_task(rx, every).await });
        ReversalTask { tx, join }
    }

    async fn reversal_task(&self, mut rx: Receiver<ReversalCheck>, every: Duration) {
        info!("Starting reversal task with {}s interval", every.as_secs());
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                request = rx.recv() => {
                    match request {
                        Some(ReversalCheck::CheckAll) => {
                            let reversed = self.check_reversals().await;
                            info!("Reversed {reversed} actions on request");
                        }
                        Some(ReversalCheck::Shutdown) | None => {
                            info!("Received shutdown request for reversal task");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    let reversed = self.check_reversals().await;
                    if reversed > 0 {
                        info!("Periodic check reversed {reversed} actions");
                    }
                }
            }
        }

        info!("Reversal task shut down");
    }
}

fn subject_notice(log: &ActionLog) -> String {
    let verb = match log.kind {
        ActionKind::Warning => "warned",
        ActionKind::Kick => "kicked",
        ActionKind::Mute => "muted",
        ActionKind::SoftBan => "softbanned",
        ActionKind::Ban => "banned",
    };
    let mut notice = format!("You have been {verb} in a server you are a member of.");
    if let Some(duration) = log.payload.timed().filter(|_| log.kind.is_reversible()) {
        notice.push_str(&format!(" This expires in {} seconds.", duration.as_secs()));
    }
    if let Some(reason) = &log.payload.reason {
        notice.push_str(&format!("\nReason: {reason}"));
    }
    notice
}

#[async_trait::async_trait]
impl ActionExecutor for ModerationService {
    async fn warn(&self, payload: ActionPayload, dm: DmOptions) -> ModerationResult<ActionLog> {
        self.run(ActionKind::Warning, payload, 0, dm).await
    }

    async fn kick(&self, payload: ActionPayload, dm: DmOptions) -> ModerationResult<ActionLog> {
        self.run(ActionKind::Kick, payload, 0, dm).await
    }

    async fn mute(&self, payload: ActionPayload, dm: DmOptions) -> ModerationResult<ActionLog> {
        if payload.role_id.is_none() {
            return Err(ModerationError::ValidationFailed("Mute requires a role".to_string()));
        }
        self.run(ActionKind::Mute, payload, 0, dm).await
    }

    async fn softban(&self, payload: ActionPayload, purge_days: u8, dm: DmOptions) -> ModerationResult<ActionLog> {
        self.run(ActionKind::SoftBan, payload, purge_days, dm).await
    }

    async fn ban(&self, payload: ActionPayload, purge_days: u8, dm: DmOptions) -> ModerationResult<ActionLog> {
        self.run(ActionKind::Ban, payload, purge_days, dm).await
    }
}
