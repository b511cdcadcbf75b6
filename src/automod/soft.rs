//! Soft punishments
//!
//! Delete, alert and log are independent. Each one that is enabled for the
//! matched word runs concurrently with the others, and a failure in one is
//! logged and swallowed without affecting the rest.

use crate::automod::error::GatewayError;
use crate::automod::filter::IncomingMessage;
use crate::automod::metrics::AutomodMetrics;
use bitflags::bitflags;
use poise::serenity_prelude::{ChannelId, GuildId, Mentionable, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

bitflags! {
    /// Soft punishment bitfield stored on each word entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ModerationFlags: u8 {
        const DELETE = 1 << 0;
        const LOG = 1 << 1;
        const ALERT = 1 << 2;
    }
}

impl ModerationFlags {
    /// Whether `flag` is set.
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        self.contains(flag)
    }
}

/// Message-level Discord calls used by soft punishments
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MessageGateway: Send + Sync {
    /// # Errors
    /// Returns [`GatewayError::NotFound`] if the message is already gone.
    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), GatewayError>;

    /// Send a message that removes itself after `lifetime`.
    ///
    /// # Errors
    /// Returns an error if the message could not be sent.
    async fn send_temporary(&self, channel_id: ChannelId, content: String, lifetime: Duration) -> Result<(), GatewayError>;
}

/// Log channel category an audit entry is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum LogCategory {
    #[display("filter-words")]
    FilterWords,
}

/// Rendered audit log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub title: String,
    pub actor_id: UserId,
    pub channel_id: ChannelId,
    /// Message content with the match highlighted
    pub content: String,
}

/// Deferred rendering; sinks with no destination never call it.
pub type LazyAuditEntry = Box<dyn FnOnce() -> AuditEntry + Send>;

/// Fire-and-forget audit log emission
pub trait AuditLogSink: Send + Sync {
    fn emit(&self, guild_id: GuildId, category: LogCategory, render: LazyAuditEntry);
}

/// What happened to one soft punishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftStatus {
    /// Flag not set, or the action does not apply here
    Skipped,
    Done,
    Failed,
}

/// Outcome of every soft punishment for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftReport {
    pub delete: SoftStatus,
    pub alert: SoftStatus,
    pub log: SoftStatus,
}

impl SoftReport {
    pub const NONE: Self = Self {
        delete: SoftStatus::Skipped,
        alert: SoftStatus::Skipped,
        log: SoftStatus::Skipped,
    };
}

pub const FILTER_WORDS_LOG_TITLE: &str = "Filtered Words";

/// Applies the soft punishment bitfield of a matched word
#[derive(Clone)]
pub struct SoftPunisher {
    gateway: Arc<dyn MessageGateway>,
    audit: Arc<dyn AuditLogSink>,
    alert_lifetime: Duration,
    metrics: Arc<AutomodMetrics>,
}

impl SoftPunisher {
    pub fn new(
        gateway: Arc<dyn MessageGateway>,
        audit: Arc<dyn AuditLogSink>,
        alert_lifetime: Duration,
        metrics: Arc<AutomodMetrics>,
    ) -> Self {
        Self {
            gateway,
            audit,
            alert_lifetime,
            metrics,
        }
    }

    /// Run every soft punishment set in `flags`.
    pub async fn apply(&self, msg: &IncomingMessage, flags: ModerationFlags, highlighted: &str) -> SoftReport {
        let log = if flags.has(ModerationFlags::LOG) {
            self.log(msg, highlighted);
            SoftStatus::Done
        } else {
            SoftStatus::Skipped
        };

        let (delete, alert) = tokio::join!(
            async {
                if flags.has(ModerationFlags::DELETE) {
                    self.delete(msg).await
                } else {
                    SoftStatus::Skipped
                }
            },
            async {
                if flags.has(ModerationFlags::ALERT) && msg.channel_sendable {
                    self.alert(msg).await
                } else {
                    SoftStatus::Skipped
                }
            },
        );

        SoftReport { delete, alert, log }
    }

    async fn delete(&self, msg: &IncomingMessage) -> SoftStatus {
        match self.gateway.delete_message(msg.channel_id, msg.message_id).await {
            Ok(()) => SoftStatus::Done,
            Err(GatewayError::NotFound) => {
                debug!(message_id = %msg.message_id, "Message already deleted");
                SoftStatus::Done
            }
            Err(e) => {
                self.metrics.record_soft_failure("delete", &e);
                SoftStatus::Failed
            }
        }
    }

    async fn alert(&self, msg: &IncomingMessage) -> SoftStatus {
        let content = format!(
            "{} your message contained a word that is not allowed here.",
            msg.author_id.mention()
        );
        match self
            .gateway
            .send_temporary(msg.channel_id, content, self.alert_lifetime)
            .await
        {
            Ok(()) => SoftStatus::Done,
            Err(e) => {
                self.metrics.record_soft_failure("alert", &e);
                SoftStatus::Failed
            }
        }
    }

    fn log(&self, msg: &IncomingMessage, highlighted: &str) {
        let actor_id = msg.author_id;
        let channel_id = msg.channel_id;
        let content = highlighted.to_owned();
        self.audit.emit(
            msg.guild_id,
            LogCategory::FilterWords,
            Box::new(move || AuditEntry {
                title: FILTER_WORDS_LOG_TITLE.to_string(),
                actor_id,
                channel_id,
                content,
            }),
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::automod::filter::tests::message;
    use std::sync::Mutex;

    /// Audit sink that renders and keeps every entry.
    #[derive(Default)]
    pub(crate) struct RecordingAudit {
        pub entries: Mutex<Vec<(GuildId, LogCategory, AuditEntry)>>,
    }

    impl AuditLogSink for RecordingAudit {
        fn emit(&self, guild_id: GuildId, category: LogCategory, render: LazyAuditEntry) {
            self.entries.lock().unwrap().push((guild_id, category, render()));
        }
    }

    fn punisher(gateway: MockMessageGateway, audit: Arc<RecordingAudit>) -> SoftPunisher {
        SoftPunisher::new(
            Arc::new(gateway),
            audit,
            Duration::from_secs(10),
            Arc::new(AutomodMetrics::new()),
        )
    }

    #[test]
    fn test_flag_membership() {
        let flags = ModerationFlags::DELETE | ModerationFlags::LOG;
        assert!(flags.has(ModerationFlags::DELETE));
        assert!(flags.has(ModerationFlags::LOG));
        assert!(!flags.has(ModerationFlags::ALERT));
        assert!(!ModerationFlags::empty().has(ModerationFlags::DELETE));
    }

    #[tokio::test]
    async fn test_empty_flags_fire_nothing() {
        let mut gateway = MockMessageGateway::new();
        gateway.expect_delete_message().never();
        gateway.expect_send_temporary().never();
        let audit = Arc::new(RecordingAudit::default());

        let report = punisher(gateway, Arc::clone(&audit))
            .apply(&message("hello"), ModerationFlags::empty(), "hello")
            .await;

        assert_eq!(report, SoftReport::NONE);
        assert!(audit.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alert_only_fires_one_alert() {
        let mut gateway = MockMessageGateway::new();
        gateway.expect_delete_message().never();
        gateway
            .expect_send_temporary()
            .times(1)
            .withf(|_, content, lifetime| content.contains("<@") && *lifetime == Duration::from_secs(10))
            .returning(|_, _, _| Ok(()));
        let audit = Arc::new(RecordingAudit::default());

        let report = punisher(gateway, Arc::clone(&audit))
            .apply(&message("bad"), ModerationFlags::ALERT, "__**bad**__")
            .await;

        assert_eq!(report.alert, SoftStatus::Done);
        assert_eq!(report.delete, SoftStatus::Skipped);
        assert_eq!(report.log, SoftStatus::Skipped);
        assert!(audit.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alert_skipped_when_channel_not_sendable() {
        let mut gateway = MockMessageGateway::new();
        gateway.expect_send_temporary().never();
        let mut msg = message("bad");
        msg.channel_sendable = false;

        let report = punisher(gateway, Arc::new(RecordingAudit::default()))
            .apply(&msg, ModerationFlags::ALERT, "__**bad**__")
            .await;
        assert_eq!(report.alert, SoftStatus::Skipped);
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_suppress_others() {
        let mut gateway = MockMessageGateway::new();
        gateway
            .expect_delete_message()
            .times(1)
            .returning(|_, _| Err(GatewayError::Forbidden("MANAGE_MESSAGES".into())));
        gateway
            .expect_send_temporary()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let audit = Arc::new(RecordingAudit::default());

        let report = punisher(gateway, Arc::clone(&audit))
            .apply(&message("bad"), ModerationFlags::all(), "__**bad**__")
            .await;

        assert_eq!(report.delete, SoftStatus::Failed);
        assert_eq!(report.alert, SoftStatus::Done);
        assert_eq!(report.log, SoftStatus::Done);

        let entries = audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let (guild_id, category, entry) = &entries[0];
        assert_eq!(*guild_id, message("bad").guild_id);
        assert_eq!(*category, LogCategory::FilterWords);
        assert_eq!(entry.content, "__**bad**__");
        assert_eq!(entry.actor_id, message("bad").author_id);
    }

    #[tokio::test]
    async fn test_already_deleted_is_not_a_failure() {
        let mut gateway = MockMessageGateway::new();
        gateway
            .expect_delete_message()
            .returning(|_, _| Err(GatewayError::NotFound));

        let report = punisher(gateway, Arc::new(RecordingAudit::default()))
            .apply(&message("bad"), ModerationFlags::DELETE, "__**bad**__")
            .await;
        assert_eq!(report.delete, SoftStatus::Done);
    }
}
