//! Automated word filter
//!
//! Scans guild messages against the guild's forbidden-word list and applies
//! the soft and hard punishments configured for the matched word.

pub mod eligibility;
pub mod error;
pub mod filter;
pub mod hard;
pub mod lock;
pub mod metrics;
pub mod normalize;
pub mod pattern;
pub mod settings;
pub mod soft;
pub mod worker;

pub use error::{AutomodError, AutomodResult};
pub use filter::{FilterOutcome, IncomingMessage, SkipReason, WordFilter};
pub use hard::{HardOutcome, HardPunishment, HardPunishmentDispatcher};
pub use lock::{DedupeKey, DedupeKind, InMemoryLockStore, LockStore};
pub use metrics::{AutomodMetrics, MetricsSnapshot};
pub use normalize::normalize;
pub use pattern::CompiledPattern;
pub use settings::{AutomodSettings, SettingsSource, WordEntry};
pub use soft::{AuditLogSink, MessageGateway, ModerationFlags, SoftPunisher, SoftReport};
pub use worker::{MatchOutcome, MatchWorker, WorkerPool};
