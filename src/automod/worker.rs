//! Match worker protocol and pool
//!
//! Pattern evaluation runs on dedicated OS threads so an expensive pattern
//! never stalls the async runtime. Callers wait under a hard timeout and treat
//! any failure as no match; the failure is still counted.

use crate::automod::error::WorkerError;
use crate::automod::metrics::AutomodMetrics;
use crate::automod::pattern::CompiledPattern;
use dashmap::DashMap;
use poise::serenity_prelude::GuildId;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

/// Compiled regex size limit in bytes
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Cached regexes per worker pool before the cache is reset
const REGEX_CACHE_CAPACITY: usize = 1024;

/// Highlight template wrapping every match
const HIGHLIGHT: &str = "__**${0}**__";

/// Kind of work requested from the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncomingType {
    RunWordFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Raw message content, not normalized
    pub content: String,
    pub pattern: CompiledPattern,
    pub kind: IncomingType,
}

impl WorkerRequest {
    pub fn word_filter(content: impl Into<String>, pattern: CompiledPattern) -> Self {
        Self {
            content: content.into(),
            pattern,
            kind: IncomingType::RunWordFilter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    NoMatch,
    FilterMatch {
        #[serde(rename = "match")]
        matched: String,
        highlighted: String,
    },
}

/// What the filter sees after failures are folded into `NoMatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    NoMatch,
    Match {
        /// Matched substring as typed
        raw: String,
        /// Whole message with every match highlighted
        highlighted: String,
    },
}

/// Request/response channel to an isolated matcher
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MatchWorker: Send + Sync {
    /// # Errors
    /// Returns [`WorkerError::Timeout`] if no response arrives within
    /// `timeout`, or another variant if the worker could not answer.
    async fn send(&self, request: WorkerRequest, timeout: Duration) -> Result<WorkerResponse, WorkerError>;
}

/// Run `content` against `pattern` and fold every failure into `NoMatch`.
pub async fn evaluate(
    worker: &dyn MatchWorker,
    content: &str,
    pattern: &CompiledPattern,
    timeout: Duration,
    metrics: &AutomodMetrics,
    guild_id: GuildId,
) -> MatchOutcome {
    let request = WorkerRequest::word_filter(content, pattern.clone());
    match worker.send(request, timeout).await {
        Ok(WorkerResponse::NoMatch) => MatchOutcome::NoMatch,
        Ok(WorkerResponse::FilterMatch { matched, highlighted }) => MatchOutcome::Match {
            raw: matched,
            highlighted,
        },
        Err(e) => {
            metrics.record_worker_error(guild_id.get(), &e, timeout);
            MatchOutcome::NoMatch
        }
    }
}

struct Job {
    request: WorkerRequest,
    reply: oneshot::Sender<Result<WorkerResponse, WorkerError>>,
}

type RegexCache = DashMap<CompiledPattern, Regex>;

/// Fixed set of matcher threads fed by a bounded queue
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    threads: usize,
}

impl WorkerPool {
    /// Start `threads` matcher threads sharing a queue of `queue_depth`.
    ///
    /// Threads exit once every handle to the pool is dropped.
    ///
    /// # Errors
    /// Returns an error if a thread could not be spawned.
    pub fn new(threads: usize, queue_depth: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let (tx, rx) = mpsc::channel::<Job>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cache: Arc<RegexCache> = Arc::new(DashMap::new());

        for index in 0..threads {
            let rx = Arc::clone(&rx);
            let cache = Arc::clone(&cache);
            std::thread::Builder::new()
                .name(format!("wordwarden-worker-{index}"))
                .spawn(move || worker_loop(&rx, &cache))?;
        }

        debug!(threads, queue_depth, "Match worker pool started");
        Ok(Self { tx, threads })
    }

    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }
}

#[async_trait::async_trait]
impl MatchWorker for WorkerPool {
    async fn send(&self, request: WorkerRequest, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        let (reply, response) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(Job { request, reply })
                .await
                .map_err(|_| WorkerError::Unavailable)?;
            response.await.map_err(|_| WorkerError::Unavailable)?
        };
        // Dropping `exchange` on timeout closes the reply channel, which the
        // worker checks before evaluating.
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| WorkerError::Timeout(timeout))?
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>, cache: &RegexCache) {
    loop {
        let job = match rx.lock() {
            Ok(mut rx) => rx.blocking_recv(),
            Err(_) => {
                error!("Match worker queue lock poisoned, stopping");
                return;
            }
        };
        let Some(job) = job else {
            trace!("Match worker queue closed");
            return;
        };
        if job.reply.is_closed() {
            trace!("Skipping abandoned match request");
            continue;
        }

        let result = match job.request.kind {
            IncomingType::RunWordFilter => run_word_filter(&job.request, cache),
        };
        // The caller may have given up in the meantime.
        let _ = job.reply.send(result);
    }
}

fn cached_regex(pattern: &CompiledPattern, cache: &RegexCache) -> Result<Regex, WorkerError> {
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = RegexBuilder::new(pattern.as_str())
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| WorkerError::InvalidPattern(e.to_string()))?;
    if cache.len() >= REGEX_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(pattern.clone(), regex.clone());
    Ok(regex)
}

fn run_word_filter(request: &WorkerRequest, cache: &RegexCache) -> Result<WorkerResponse, WorkerError> {
    let regex = cached_regex(&request.pattern, cache)?;
    let Some(found) = regex.find(&request.content) else {
        return Ok(WorkerResponse::NoMatch);
    };
    Ok(WorkerResponse::FilterMatch {
        matched: found.as_str().to_owned(),
        highlighted: regex.replace_all(&request.content, HIGHLIGHT).into_owned(),
    })
}
