//! Word filter orchestration
//!
//! One [`WordFilter::run`] per guild message. Each step either continues or
//! ends processing with a [`SkipReason`]; only a resolved match reaches the
//! punishment stage, where soft and hard punishments run side by side.

use crate::automod::hard::{HardOutcome, HardPunishmentDispatcher};
use crate::automod::metrics::AutomodMetrics;
use crate::automod::normalize::normalize;
use crate::automod::settings::{SettingsSource, WordEntry};
use crate::automod::soft::{SoftPunisher, SoftReport};
use crate::automod::worker::{MatchOutcome, MatchWorker, evaluate};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::sync::Arc;
use std::time::Duration;

/// Guild message as seen by the filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    /// Author holds moderator permissions or a moderator role
    pub author_is_moderator: bool,
    /// The bot can post in the origin channel
    pub channel_sendable: bool,
    pub content: String,
}

/// Why a message ended without punishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SkipReason {
    #[display("author is a moderator")]
    Moderator,
    #[display("word filter disabled")]
    FilterDisabled,
    #[display("settings unavailable")]
    SettingsUnavailable,
    #[display("no match")]
    NoMatch,
    #[display("match resolved to no word entry")]
    UnknownWord,
}

/// Result of filtering one message
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Skipped(SkipReason),
    Dispatched {
        /// Canonical word of the resolved entry
        word: String,
        soft: SoftReport,
        hard: HardOutcome,
    },
}

/// Find the entry whose normalized word equals the normalized match.
#[must_use]
pub fn resolve_word<'a>(words: &'a [WordEntry], matched: &str) -> Option<&'a WordEntry> {
    let needle = normalize(matched);
    if needle.is_empty() {
        return None;
    }
    words.iter().find(|entry| normalize(&entry.word) == needle)
}

/// The per-message pipeline
#[derive(Clone)]
pub struct WordFilter {
    settings: Arc<dyn SettingsSource>,
    worker: Arc<dyn MatchWorker>,
    soft: SoftPunisher,
    hard: HardPunishmentDispatcher,
    worker_timeout: Duration,
    metrics: Arc<AutomodMetrics>,
}

impl WordFilter {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        worker: Arc<dyn MatchWorker>,
        soft: SoftPunisher,
        hard: HardPunishmentDispatcher,
        worker_timeout: Duration,
        metrics: Arc<AutomodMetrics>,
    ) -> Self {
        Self {
            settings,
            worker,
            soft,
            hard,
            worker_timeout,
            metrics,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &AutomodMetrics {
        &self.metrics
    }

    pub async fn run(&self, msg: &IncomingMessage) -> FilterOutcome {
        self.metrics.record_scanned();

        if msg.author_is_moderator {
            self.metrics.record_moderator_skip();
            return FilterOutcome::Skipped(SkipReason::Moderator);
        }

        let settings = match self.settings.acquire(msg.guild_id).await {
            Ok(settings) => settings,
            Err(e) => {
                self.metrics
                    .record_settings_failure(msg.guild_id.get(), &e.to_string());
                return FilterOutcome::Skipped(SkipReason::SettingsUnavailable);
            }
        };
        let Some(pattern) = settings.pattern.as_ref() else {
            self.metrics.record_filter_disabled();
            return FilterOutcome::Skipped(SkipReason::FilterDisabled);
        };

        let outcome = evaluate(
            self.worker.as_ref(),
            &msg.content,
            pattern,
            self.worker_timeout,
            &self.metrics,
            msg.guild_id,
        )
        .await;
        let MatchOutcome::Match { raw, highlighted } = outcome else {
            return FilterOutcome::Skipped(SkipReason::NoMatch);
        };

        let Some(entry) = resolve_word(&settings.words, &raw) else {
            self.metrics
                .record_invariant_violation(msg.guild_id.get(), &normalize(&raw));
            return FilterOutcome::Skipped(SkipReason::UnknownWord);
        };
        self.metrics.record_match(msg.guild_id.get(), &entry.word);

        let (soft, hard) = tokio::join!(
            self.soft.apply(msg, entry.soft_punish, &highlighted),
            self.hard.dispatch(msg, entry, &settings),
        );

        FilterOutcome::Dispatched {
            word: entry.word.clone(),
            soft,
            hard,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::automod::error::{SettingsError, WorkerError};
    use crate::automod::hard::HardPunishment;
    use crate::automod::lock::InMemoryLockStore;
    use crate::automod::pattern::CompiledPattern;
    use crate::automod::settings::{AutomodSettings, MockSettingsSource};
    use crate::automod::soft::tests::RecordingAudit;
    use crate::automod::soft::{MockMessageGateway, ModerationFlags, SoftStatus};
    use crate::automod::worker::{MockMatchWorker, WorkerPool};
    use crate::moderation::{ActionKind, ActionLog, MockActionExecutor};

    /// Plain member message in a sendable channel.
    pub(crate) fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            guild_id: GuildId::new(100),
            channel_id: ChannelId::new(200),
            message_id: MessageId::new(300),
            author_id: UserId::new(400),
            author_is_moderator: false,
            channel_sendable: true,
            content: content.to_string(),
        }
    }

    fn settings_with(words: Vec<WordEntry>) -> AutomodSettings {
        let pattern = CompiledPattern::from_words(words.iter().map(|w| w.word.as_str()));
        AutomodSettings {
            pattern,
            words: words.into(),
            ..AutomodSettings::disabled()
        }
    }

    fn source(settings: AutomodSettings) -> MockSettingsSource {
        let mut source = MockSettingsSource::new();
        source
            .expect_acquire()
            .returning(move |_| Ok(settings.clone()));
        source
    }

    struct Parts {
        settings: MockSettingsSource,
        worker: Arc<dyn MatchWorker>,
        gateway: MockMessageGateway,
        executor: MockActionExecutor,
    }

    fn build(parts: Parts) -> (WordFilter, Arc<AutomodMetrics>) {
        let metrics = Arc::new(AutomodMetrics::new());
        let soft = SoftPunisher::new(
            Arc::new(parts.gateway),
            Arc::new(RecordingAudit::default()),
            Duration::from_secs(10),
            Arc::clone(&metrics),
        );
        let hard = HardPunishmentDispatcher::new(
            Arc::new(parts.executor),
            Arc::new(InMemoryLockStore::new()),
            UserId::new(999),
            Duration::from_secs(20),
            Arc::clone(&metrics),
        );
        let filter = WordFilter::new(
            Arc::new(parts.settings),
            parts.worker,
            soft,
            hard,
            Duration::from_millis(500),
            Arc::clone(&metrics),
        );
        (filter, metrics)
    }

    fn pool() -> Arc<dyn MatchWorker> {
        Arc::new(WorkerPool::new(1, 8).unwrap())
    }

    #[test]
    fn test_resolve_word() {
        let words = vec![WordEntry::new("badword"), WordEntry::new("slur")];
        assert_eq!(resolve_word(&words, "b4dw0rd").map(|w| w.word.as_str()), Some("badword"));
        assert_eq!(resolve_word(&words, "S.L.U.R").map(|w| w.word.as_str()), Some("slur"));
        assert!(resolve_word(&words, "other").is_none());
        assert!(resolve_word(&words, "!!").is_none());
    }

    #[tokio::test]
    async fn test_moderator_never_triggers() {
        let mut settings = MockSettingsSource::new();
        settings.expect_acquire().never();
        let mut worker = MockMatchWorker::new();
        worker.expect_send().never();
        let (filter, metrics) = build(Parts {
            settings,
            worker: Arc::new(worker),
            gateway: MockMessageGateway::new(),
            executor: MockActionExecutor::new(),
        });

        let mut msg = message("badword");
        msg.author_is_moderator = true;
        assert_eq!(filter.run(&msg).await, FilterOutcome::Skipped(SkipReason::Moderator));
        assert_eq!(metrics.snapshot().moderator_skips, 1);
    }

    #[tokio::test]
    async fn test_disabled_filter_makes_no_worker_call() {
        let mut worker = MockMatchWorker::new();
        worker.expect_send().never();
        let mut settings = AutomodSettings::disabled();
        settings.words = vec![WordEntry::new("badword").with_soft(ModerationFlags::all())].into();
        let (filter, metrics) = build(Parts {
            settings: source(settings),
            worker: Arc::new(worker),
            gateway: MockMessageGateway::new(),
            executor: MockActionExecutor::new(),
        });

        assert_eq!(
            filter.run(&message("badword")).await,
            FilterOutcome::Skipped(SkipReason::FilterDisabled)
        );
        assert_eq!(metrics.snapshot().filter_disabled, 1);
    }

    #[tokio::test]
    async fn test_settings_failure_skips() {
        let mut settings = MockSettingsSource::new();
        settings
            .expect_acquire()
            .returning(|_| Err(SettingsError::Unavailable("reload in progress".into())));
        let (filter, metrics) = build(Parts {
            settings,
            worker: pool(),
            gateway: MockMessageGateway::new(),
            executor: MockActionExecutor::new(),
        });

        assert_eq!(
            filter.run(&message("badword")).await,
            FilterOutcome::Skipped(SkipReason::SettingsUnavailable)
        );
        assert_eq!(metrics.snapshot().settings_failures, 1);
    }

    #[tokio::test]
    async fn test_worker_timeout_behaves_like_no_match() {
        let mut worker = MockMatchWorker::new();
        worker
            .expect_send()
            .times(1)
            .returning(|_, timeout| Err(WorkerError::Timeout(timeout)));
        let mut gateway = MockMessageGateway::new();
        gateway.expect_delete_message().never();
        gateway.expect_send_temporary().never();
        let mut executor = MockActionExecutor::new();
        executor.expect_ban().never();
        let words = vec![
            WordEntry::new("badword")
                .with_soft(ModerationFlags::all())
                .with_hard(HardPunishment::Ban, None),
        ];
        let (filter, metrics) = build(Parts {
            settings: source(settings_with(words)),
            worker: Arc::new(worker),
            gateway,
            executor,
        });

        assert_eq!(
            filter.run(&message("badword")).await,
            FilterOutcome::Skipped(SkipReason::NoMatch)
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.worker_timeouts, 1);
        assert_eq!(snapshot.matches, 0);
    }

    #[tokio::test]
    async fn test_unknown_word_is_an_invariant_violation() {
        let mut worker = MockMatchWorker::new();
        worker.expect_send().returning(|_, _| {
            Ok(crate::automod::worker::WorkerResponse::FilterMatch {
                matched: "something".to_string(),
                highlighted: "__**something**__".to_string(),
            })
        });
        let (filter, metrics) = build(Parts {
            settings: source(settings_with(vec![WordEntry::new("badword")])),
            worker: Arc::new(worker),
            gateway: MockMessageGateway::new(),
            executor: MockActionExecutor::new(),
        });

        assert_eq!(
            filter.run(&message("something")).await,
            FilterOutcome::Skipped(SkipReason::UnknownWord)
        );
        assert_eq!(metrics.snapshot().invariant_violations, 1);
    }

    #[tokio::test]
    async fn test_soft_failure_does_not_block_hard() {
        let mut gateway = MockMessageGateway::new();
        gateway
            .expect_delete_message()
            .times(1)
            .returning(|_, _| Err(crate::automod::error::GatewayError::Api("500".into())));
        let mut executor = MockActionExecutor::new();
        executor
            .expect_kick()
            .times(1)
            .returning(|payload, _| Ok(ActionLog::new(ActionKind::Kick, payload)));
        let words = vec![
            WordEntry::new("badword")
                .with_soft(ModerationFlags::DELETE)
                .with_hard(HardPunishment::Kick, None),
        ];
        let (filter, metrics) = build(Parts {
            settings: source(settings_with(words)),
            worker: pool(),
            gateway,
            executor,
        });

        let outcome = filter.run(&message("what a B@DW0RD")).await;
        let FilterOutcome::Dispatched { word, soft, hard } = outcome else {
            panic!("expected dispatch, got {outcome:?}");
        };
        assert_eq!(word, "badword");
        assert_eq!(soft.delete, SoftStatus::Failed);
        assert!(matches!(hard, HardOutcome::Executed(_)));
        assert_eq!(metrics.snapshot().soft_failures, 1);
    }
}
