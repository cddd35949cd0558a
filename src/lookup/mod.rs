//! Tiered jargon lookup: local dictionary → persistent cache → remote API.
//!
//! The orchestrator walks each request through a validated phase chain.
//! Dictionary and cache hits short-circuit; remote answers are written back
//! with a 7-day TTL (unless the service returned its not-found sentinel)
//! and fanned out to every page context.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::metrics::{metric_names, MetricsRegistry};
use crate::storage::StorageError;

pub mod cache;
pub mod dictionary;
pub mod fingerprint;
pub mod resolver;

use cache::{CacheEntry, JargonCache, DEFAULT_TTL_SECS};
use dictionary::LocalDictionary;
use resolver::{Interpret, ResolveError};

/// Phases of a single lookup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LookupPhase {
    Init,
    CheckLocalDict,
    CheckCache,
    CallRemote,
    WriteCache,
    Done,
    Error,
}

impl std::fmt::Display for LookupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupPhase::Init => write!(f, "Init"),
            LookupPhase::CheckLocalDict => write!(f, "CheckLocalDict"),
            LookupPhase::CheckCache => write!(f, "CheckCache"),
            LookupPhase::CallRemote => write!(f, "CallRemote"),
            LookupPhase::WriteCache => write!(f, "WriteCache"),
            LookupPhase::Done => write!(f, "Done"),
            LookupPhase::Error => write!(f, "Error"),
        }
    }
}

impl LookupPhase {
    /// Whether moving from `self` to `next` follows the tier chain.
    pub fn can_advance_to(self, next: LookupPhase) -> bool {
        matches!(
            (self, next),
            (LookupPhase::Init, LookupPhase::CheckLocalDict)
                | (LookupPhase::CheckLocalDict, LookupPhase::Done) // dictionary hit
                | (LookupPhase::CheckLocalDict, LookupPhase::CheckCache)
                | (LookupPhase::CheckCache, LookupPhase::Done) // cache hit
                | (LookupPhase::CheckCache, LookupPhase::CallRemote)
                | (LookupPhase::CheckCache, LookupPhase::Error) // storage read failed
                | (LookupPhase::CallRemote, LookupPhase::WriteCache)
                | (LookupPhase::CallRemote, LookupPhase::Done) // sentinel, nothing to persist
                | (LookupPhase::CallRemote, LookupPhase::Error)
                | (LookupPhase::WriteCache, LookupPhase::Done)
                | (LookupPhase::WriteCache, LookupPhase::Error) // storage write failed
        )
    }
}

/// Per-request phase tracker. Transitions are validated and logged; a
/// violation indicates an orchestrator bug, not a recoverable condition.
struct LookupTrace {
    request_id: String,
    phase: LookupPhase,
}

impl LookupTrace {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            phase: LookupPhase::Init,
        }
    }

    fn advance(&mut self, next: LookupPhase) {
        if self.phase.can_advance_to(next) {
            trace!(request_id = %self.request_id, from = %self.phase, to = %next, "lookup_phase");
        } else {
            warn!(request_id = %self.request_id, from = %self.phase, to = %next, "invalid_lookup_phase");
        }
        self.phase = next;
    }
}

/// Which tier produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LookupSource {
    LocalDict,
    Cache,
    Remote,
}

/// Answer for one lookup request.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub meaning_line: String,
    /// True only when the answer came out of the persistent cache.
    pub from_cache: bool,
    pub source: LookupSource,
}

#[derive(Debug)]
pub enum LookupError {
    Resolve(ResolveError),
    Storage(StorageError),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::Resolve(e) => write!(f, "{e}"),
            LookupError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LookupError {}

impl From<ResolveError> for LookupError {
    fn from(e: ResolveError) -> Self {
        LookupError::Resolve(e)
    }
}

impl From<StorageError> for LookupError {
    fn from(e: StorageError) -> Self {
        LookupError::Storage(e)
    }
}

/// Walks requests through the tier chain.
pub struct LookupOrchestrator {
    dictionary: LocalDictionary,
    cache: JargonCache,
    resolver: Arc<dyn Interpret>,
    metrics: Arc<MetricsRegistry>,
}

impl LookupOrchestrator {
    pub fn new(
        dictionary: LocalDictionary,
        cache: JargonCache,
        resolver: Arc<dyn Interpret>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            dictionary,
            cache,
            resolver,
            metrics,
        }
    }

    /// Resolve one (term, context) pair.
    ///
    /// Concurrent lookups for the same key are not de-duplicated: each walks
    /// the chain on its own and the last write-back wins. `cancel` aborts
    /// only the remote call; earlier tiers are too cheap to interrupt.
    pub async fn lookup(
        &self,
        request_id: &str,
        term: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<LookupResult, LookupError> {
        let total_start = Instant::now();
        let mut lookup_trace = LookupTrace::new(request_id);

        lookup_trace.advance(LookupPhase::CheckLocalDict);
        let tier_start = Instant::now();
        if let Some(line) = self.dictionary.lookup(term) {
            self.metrics.record(
                metric_names::LOOKUP_LOCAL_DICT,
                tier_start.elapsed().as_micros() as f64,
            );
            lookup_trace.advance(LookupPhase::Done);
            info!(request_id, term, "lookup served by local dictionary");
            return Ok(LookupResult {
                meaning_line: line.to_string(),
                from_cache: false,
                source: LookupSource::LocalDict,
            });
        }

        lookup_trace.advance(LookupPhase::CheckCache);
        let tier_start = Instant::now();
        let cached = match self.cache.get(term, context) {
            Ok(hit) => hit,
            Err(e) => {
                lookup_trace.advance(LookupPhase::Error);
                warn!(request_id, term, error = %e, "cache read failed");
                return Err(e.into());
            }
        };
        if let Some(entry) = cached {
            self.metrics.record(
                metric_names::LOOKUP_CACHE,
                tier_start.elapsed().as_micros() as f64,
            );
            lookup_trace.advance(LookupPhase::Done);
            info!(request_id, term, "lookup served by cache");
            return Ok(LookupResult {
                meaning_line: entry.meaning_line,
                from_cache: true,
                source: LookupSource::Cache,
            });
        }

        lookup_trace.advance(LookupPhase::CallRemote);
        let tier_start = Instant::now();
        let answer = match self.resolver.interpret(term, context, cancel).await {
            Ok(answer) => answer,
            Err(e) => {
                lookup_trace.advance(LookupPhase::Error);
                warn!(request_id, term, error = %e, "remote interpretation failed");
                return Err(e.into());
            }
        };
        self.metrics.record(
            metric_names::LOOKUP_REMOTE,
            tier_start.elapsed().as_micros() as f64,
        );

        if answer.cacheable {
            lookup_trace.advance(LookupPhase::WriteCache);
            let write_start = Instant::now();
            let host = if answer.source_host.is_empty() {
                None
            } else {
                Some(answer.source_host.clone())
            };
            let entry = CacheEntry::new(answer.meaning_line.clone(), Some(DEFAULT_TTL_SECS), host);
            if let Err(e) = self.cache.set(term, context, entry) {
                lookup_trace.advance(LookupPhase::Error);
                warn!(request_id, term, error = %e, "cache write failed");
                return Err(e.into());
            }
            self.metrics.record(
                metric_names::CACHE_WRITE,
                write_start.elapsed().as_micros() as f64,
            );
            lookup_trace.advance(LookupPhase::Done);
            info!(request_id, term, "lookup served remotely and cached");
        } else {
            lookup_trace.advance(LookupPhase::Done);
            info!(request_id, term, "lookup served remotely, not cacheable");
        }

        self.metrics.record(
            metric_names::LOOKUP_TOTAL,
            total_start.elapsed().as_micros() as f64,
        );
        Ok(LookupResult {
            meaning_line: answer.meaning_line,
            from_cache: false,
            source: LookupSource::Remote,
        })
    }
}
