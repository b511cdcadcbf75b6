//! End-to-end runs of the word filter with the real matcher pool, settings
//! store and lock store, and recording fakes at the Discord edges.

use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wordwarden::GuildSettingsStore;
use wordwarden::automod::error::{GatewayError, WorkerError};
use wordwarden::automod::soft::{AuditEntry, LazyAuditEntry, LogCategory, SoftStatus};
use wordwarden::automod::worker::{WorkerRequest, WorkerResponse};
use wordwarden::automod::{
    AuditLogSink, AutomodMetrics, FilterOutcome, HardOutcome, HardPunishment, HardPunishmentDispatcher,
    InMemoryLockStore, MatchWorker, MessageGateway, ModerationFlags, SettingsSource, SkipReason, SoftPunisher, WordEntry,
    WordFilter, WorkerPool,
};
use wordwarden::moderation::{
    ActionExecutor, ActionKind, ActionLog, ActionPayload, DmOptions, ModerationResult,
};

const GUILD: u64 = 100;
const AUTHOR: u64 = 400;
const BOT: u64 = 1;
const TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(ActionKind, ActionPayload)>>,
}

impl RecordingExecutor {
    fn record(&self, kind: ActionKind, payload: ActionPayload) -> ModerationResult<ActionLog> {
        self.calls.lock().unwrap().push((kind, payload.clone()));
        Ok(ActionLog::new(kind, payload))
    }

    fn kinds(&self) -> Vec<ActionKind> {
        self.calls.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }
}

#[async_trait::async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn warn(&self, payload: ActionPayload, _dm: DmOptions) -> ModerationResult<ActionLog> {
        self.record(ActionKind::Warning, payload)
    }

    async fn kick(&self, payload: ActionPayload, _dm: DmOptions) -> ModerationResult<ActionLog> {
        self.record(ActionKind::Kick, payload)
    }

    async fn mute(&self, payload: ActionPayload, _dm: DmOptions) -> ModerationResult<ActionLog> {
        self.record(ActionKind::Mute, payload)
    }

    async fn softban(&self, payload: ActionPayload, _purge_days: u8, _dm: DmOptions) -> ModerationResult<ActionLog> {
        self.record(ActionKind::SoftBan, payload)
    }

    async fn ban(&self, payload: ActionPayload, _purge_days: u8, _dm: DmOptions) -> ModerationResult<ActionLog> {
        // Give a racing message time to reach the lock.
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.record(ActionKind::Ban, payload)
    }
}

#[derive(Default)]
struct RecordingGateway {
    deleted: Mutex<Vec<MessageId>>,
    alerts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MessageGateway for RecordingGateway {
    async fn delete_message(&self, _channel_id: ChannelId, message_id: MessageId) -> Result<(), GatewayError> {
        self.deleted.lock().unwrap().push(message_id);
        Ok(())
    }

    async fn send_temporary(&self, _channel_id: ChannelId, content: String, _lifetime: Duration) -> Result<(), GatewayError> {
        self.alerts.lock().unwrap().push(content);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLogSink for RecordingAudit {
    fn emit(&self, _guild_id: GuildId, _category: LogCategory, render: LazyAuditEntry) {
        self.entries.lock().unwrap().push(render());
    }
}

/// Counts requests before handing them to the real pool
struct CountingWorker {
    inner: WorkerPool,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl MatchWorker for CountingWorker {
    async fn send(&self, request: WorkerRequest, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request, timeout).await
    }
}

/// Never answers in time
struct StalledWorker;

#[async_trait::async_trait]
impl MatchWorker for StalledWorker {
    async fn send(&self, _request: WorkerRequest, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        tokio::time::sleep(timeout).await;
        Err(WorkerError::Timeout(timeout))
    }
}

struct Harness {
    filter: WordFilter,
    settings: Arc<GuildSettingsStore>,
    worker: Arc<CountingWorker>,
    executor: Arc<RecordingExecutor>,
    gateway: Arc<RecordingGateway>,
    audit: Arc<RecordingAudit>,
    metrics: Arc<AutomodMetrics>,
}

impl Harness {
    fn new() -> Self {
        let worker = Arc::new(CountingWorker {
            inner: WorkerPool::new(2, 16).unwrap(),
            calls: AtomicUsize::new(0),
        });
        Self::with_worker(Arc::clone(&worker) as Arc<dyn MatchWorker>, worker)
    }

    fn with_worker(matcher: Arc<dyn MatchWorker>, worker: Arc<CountingWorker>) -> Self {
        let settings = Arc::new(GuildSettingsStore::new("unused.yaml"));
        let executor = Arc::new(RecordingExecutor::default());
        let gateway = Arc::new(RecordingGateway::default());
        let audit = Arc::new(RecordingAudit::default());
        let metrics = Arc::new(AutomodMetrics::new());

        let soft = SoftPunisher::new(
            Arc::clone(&gateway) as Arc<dyn MessageGateway>,
            Arc::clone(&audit) as Arc<dyn AuditLogSink>,
            Duration::from_secs(10),
            Arc::clone(&metrics),
        );
        let hard = HardPunishmentDispatcher::new(
            Arc::clone(&executor) as Arc<dyn ActionExecutor>,
            Arc::new(InMemoryLockStore::new()),
            UserId::new(BOT),
            Duration::from_secs(20),
            Arc::clone(&metrics),
        );
        let filter = WordFilter::new(
            Arc::clone(&settings) as Arc<dyn SettingsSource>,
            matcher,
            soft,
            hard,
            TIMEOUT,
            Arc::clone(&metrics),
        );

        Self {
            filter,
            settings,
            worker,
            executor,
            gateway,
            audit,
            metrics,
        }
    }

    fn add_word(&self, entry: WordEntry) {
        assert!(self.settings.add_word(GuildId::new(GUILD), entry));
    }
}

fn message(id: u64, content: &str) -> wordwarden::automod::IncomingMessage {
    wordwarden::automod::IncomingMessage {
        guild_id: GuildId::new(GUILD),
        channel_id: ChannelId::new(200),
        message_id: MessageId::new(id),
        author_id: UserId::new(AUTHOR),
        author_is_moderator: false,
        channel_sendable: true,
        content: content.to_string(),
    }
}

#[tokio::test]
async fn scenario_a_leetspeak_is_deleted_logged_and_warned() {
    let harness = Harness::new();
    harness.add_word(
        WordEntry::new("badword")
            .with_soft(ModerationFlags::DELETE | ModerationFlags::LOG)
            .with_hard(HardPunishment::Warning, None),
    );

    let outcome = harness.filter.run(&message(300, "you are a b4dw0rd")).await;

    let FilterOutcome::Dispatched { word, soft, hard } = outcome else {
        panic!("expected dispatch, got {outcome:?}");
    };
    assert_eq!(word, "badword");
    assert_eq!(soft.delete, SoftStatus::Done);
    assert_eq!(soft.log, SoftStatus::Done);
    assert_eq!(soft.alert, SoftStatus::Skipped);
    let HardOutcome::Executed(log) = hard else {
        panic!("expected a warning, got {hard:?}");
    };
    assert_eq!(log.kind, ActionKind::Warning);
    assert_eq!(log.payload.actor_id, UserId::new(BOT));
    assert_eq!(log.payload.reference, Some(300));

    assert_eq!(*harness.gateway.deleted.lock().unwrap(), vec![MessageId::new(300)]);
    let entries = harness.audit.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].content.contains("__**b4dw0rd**__"));
    assert!(harness.gateway.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_b_racing_matches_ban_once() {
    let harness = Harness::new();
    harness.add_word(WordEntry::new("slur").with_hard(HardPunishment::Ban, None));

    let first = message(301, "slur");
    let second = message(302, "s.l.u.r again");
    let (a, b) = tokio::join!(harness.filter.run(&first), harness.filter.run(&second));

    let hard: Vec<HardOutcome> = [a, b]
        .into_iter()
        .map(|outcome| match outcome {
            FilterOutcome::Dispatched { hard, .. } => hard,
            other => panic!("expected dispatch, got {other:?}"),
        })
        .collect();
    assert_eq!(
        hard.iter().filter(|h| matches!(h, HardOutcome::Executed(_))).count(),
        1
    );
    assert!(hard.contains(&HardOutcome::LockHeld(wordwarden::automod::DedupeKind::Ban)));
    assert_eq!(harness.executor.kinds(), vec![ActionKind::Ban]);

    // No soft flags, so nothing else happened.
    assert!(harness.gateway.deleted.lock().unwrap().is_empty());
    assert!(harness.gateway.alerts.lock().unwrap().is_empty());
    assert!(harness.audit.entries.lock().unwrap().is_empty());
    assert_eq!(harness.metrics.snapshot().lock_contended, 1);
}

#[tokio::test]
async fn scenario_c_disabled_filter_never_calls_worker() {
    let harness = Harness::new();
    harness.add_word(WordEntry::new("badword").with_soft(ModerationFlags::all()));
    harness.settings.set_filter_enabled(GuildId::new(GUILD), false);

    let outcome = harness.filter.run(&message(303, "badword")).await;

    assert_eq!(outcome, FilterOutcome::Skipped(SkipReason::FilterDisabled));
    assert_eq!(harness.worker.calls.load(Ordering::SeqCst), 0);
    assert!(harness.executor.kinds().is_empty());
}

#[tokio::test]
async fn moderators_are_never_punished() {
    let harness = Harness::new();
    harness.add_word(
        WordEntry::new("badword")
            .with_soft(ModerationFlags::all())
            .with_hard(HardPunishment::Ban, None),
    );
    let mut msg = message(304, "badword badword");
    msg.author_is_moderator = true;

    let outcome = harness.filter.run(&msg).await;

    assert_eq!(outcome, FilterOutcome::Skipped(SkipReason::Moderator));
    assert_eq!(harness.worker.calls.load(Ordering::SeqCst), 0);
    assert!(harness.executor.kinds().is_empty());
    assert!(harness.gateway.deleted.lock().unwrap().is_empty());
    assert_eq!(harness.metrics.snapshot().moderator_skips, 1);
}

#[tokio::test]
async fn alert_only_sends_a_single_alert() {
    let harness = Harness::new();
    harness.add_word(WordEntry::new("badword").with_soft(ModerationFlags::ALERT));

    let outcome = harness.filter.run(&message(305, "badword")).await;

    assert!(matches!(
        outcome,
        FilterOutcome::Dispatched {
            hard: HardOutcome::NotConfigured,
            ..
        }
    ));
    assert_eq!(harness.gateway.alerts.lock().unwrap().len(), 1);
    assert!(harness.gateway.deleted.lock().unwrap().is_empty());
    assert!(harness.audit.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn clean_messages_do_nothing() {
    let harness = Harness::new();
    harness.add_word(
        WordEntry::new("badword")
            .with_soft(ModerationFlags::all())
            .with_hard(HardPunishment::Kick, None),
    );

    let outcome = harness.filter.run(&message(306, "a perfectly good word")).await;

    assert_eq!(outcome, FilterOutcome::Skipped(SkipReason::NoMatch));
    assert_eq!(harness.worker.calls.load(Ordering::SeqCst), 1);
    assert!(harness.executor.kinds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn worker_timeout_acts_like_no_match() {
    let placeholder = Arc::new(CountingWorker {
        inner: WorkerPool::new(1, 1).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let harness = Harness::with_worker(Arc::new(StalledWorker), placeholder);
    harness.add_word(
        WordEntry::new("badword")
            .with_soft(ModerationFlags::all())
            .with_hard(HardPunishment::Ban, None),
    );

    let outcome = harness.filter.run(&message(307, "badword")).await;

    assert_eq!(outcome, FilterOutcome::Skipped(SkipReason::NoMatch));
    assert!(harness.executor.kinds().is_empty());
    assert!(harness.gateway.deleted.lock().unwrap().is_empty());
    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.worker_timeouts, 1);
    assert_eq!(snapshot.worker_failures, 0);
    assert_eq!(snapshot.matches, 0);
}
