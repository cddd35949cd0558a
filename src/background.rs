//! Background service context.
//!
//! Owns the storage, the tier chain, and the tab registry. Page contexts
//! talk to it through a bounded request queue with per-request reply slots;
//! navigation events and the activation flag fan out as broadcasts. PING is
//! answered inline, while each FETCH_JARGON runs as its own task so one
//! slow remote call never serializes the queue behind it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::lookup::LookupOrchestrator;
use crate::metrics::{metric_names, MetricSummary, MetricsRegistry};
use crate::protocol::{Broadcast, PageRequest, PageResponse};
use crate::storage::{Storage, StorageError};
use crate::tabs::{TabId, TabRegistry};

/// Storage key for the user-facing activation flag.
pub const ACTIVE_KEY: &str = "isActive";

const REQUEST_QUEUE_DEPTH: usize = 64;

/// One queued page request with its reply slot.
struct Envelope {
    request: PageRequest,
    reply: oneshot::Sender<PageResponse>,
    enqueued_at: Instant,
}

/// The service loop is gone or dropped the reply slot.
#[derive(Debug)]
pub enum RequestError {
    NoResponse,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::NoResponse => write!(f, "no response from background"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Cheap clonable endpoint page contexts use to reach the service loop.
#[derive(Clone)]
pub struct BackgroundHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BackgroundHandle {
    /// Round-trip one request. Waits for the reply or reports NoResponse
    /// when the service (or the task answering us) went away.
    pub async fn request(&self, request: PageRequest) -> Result<PageResponse, RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: reply_tx,
                enqueued_at: Instant::now(),
            })
            .await
            .map_err(|_| RequestError::NoResponse)?;
        reply_rx.await.map_err(|_| RequestError::NoResponse)
    }
}

/// Shared state of the background execution context.
pub struct Background {
    orchestrator: LookupOrchestrator,
    storage: Arc<Storage>,
    tabs: Arc<TabRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl Background {
    pub fn new(
        orchestrator: LookupOrchestrator,
        storage: Arc<Storage>,
        tabs: Arc<TabRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            orchestrator,
            storage,
            tabs,
            metrics,
        }
    }

    /// Start the service loop and return the handle pages connect with.
    pub fn spawn(self: &Arc<Self>) -> BackgroundHandle {
        let (tx, mut rx) = mpsc::channel::<Envelope>(REQUEST_QUEUE_DEPTH);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            info!("background service loop started");
            while let Some(envelope) = rx.recv().await {
                service.metrics.record(
                    metric_names::QUEUE_WAIT_BG,
                    envelope.enqueued_at.elapsed().as_micros() as f64,
                );
                service.dispatch(envelope);
            }
            info!("background service loop exiting");
        });
        BackgroundHandle { tx }
    }

    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        match envelope.request {
            PageRequest::Ping => {
                let _ = envelope.reply.send(PageResponse::pong());
            }
            PageRequest::FetchJargon { term, context } => {
                let service = Arc::clone(self);
                let reply = envelope.reply;
                tokio::spawn(async move {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    debug!(request_id, term = %term, "fetch accepted");
                    let cancel = CancellationToken::new();
                    let response = match service
                        .orchestrator
                        .lookup(&request_id, &term, &context, &cancel)
                        .await
                    {
                        Ok(result) => PageResponse::fetched(result.meaning_line, result.from_cache),
                        Err(e) => PageResponse::failed(e.to_string()),
                    };
                    if reply.send(response).is_err() {
                        debug!(request_id, "requesting page went away before the reply");
                    }
                });
            }
        }
    }

    /// A top-level navigation committed in `tab`. Web pages get their
    /// tooltip dismissed; special schemes are ignored.
    pub fn navigation_committed(&self, tab: TabId, url: &str) {
        self.dismiss_tooltip(tab, url, "navigation_committed");
    }

    /// Same-document history change (SPA route updates).
    pub fn history_state_updated(&self, tab: TabId, url: &str) {
        self.dismiss_tooltip(tab, url, "history_state_updated");
    }

    fn dismiss_tooltip(&self, tab: TabId, url: &str, trigger: &'static str) {
        if !is_web_url(url) {
            debug!(tab, url, trigger, "navigation outside web pages ignored");
            return;
        }
        let delivered = self.tabs.send_to(tab, Broadcast::ClearTip);
        debug!(tab, trigger, delivered, "tooltip dismissal requested");
    }

    /// Current activation flag; absent means inactive.
    pub fn is_active(&self) -> Result<bool, StorageError> {
        Ok(self.storage.get::<bool>(ACTIVE_KEY)?.unwrap_or(false))
    }

    /// Persist the activation flag and tell every page about it.
    pub fn set_active(&self, active: bool) -> Result<(), StorageError> {
        self.storage.set(ACTIVE_KEY, &active)?;
        let delivered = self.tabs.broadcast(&Broadcast::Toggle { is_active: active });
        info!(active, delivered, "activation flag updated");
        Ok(())
    }

    /// Timing quantiles for everything the pipeline recorded so far.
    pub fn metrics_summary(&self) -> HashMap<String, MetricSummary> {
        self.metrics.summary()
    }

    pub fn tabs(&self) -> &Arc<TabRegistry> {
        &self.tabs
    }
}

fn is_web_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::cache::JargonCache;
    use crate::lookup::dictionary::LocalDictionary;
    use crate::lookup::resolver::StubResolver;

    fn service_with(resolver: StubResolver) -> (Arc<Background>, BackgroundHandle) {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let tabs = Arc::new(TabRegistry::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let orchestrator = LookupOrchestrator::new(
            LocalDictionary::empty(),
            JargonCache::new(storage.clone(), tabs.clone()),
            Arc::new(resolver),
            metrics.clone(),
        );
        let service = Arc::new(Background::new(orchestrator, storage, tabs, metrics));
        let handle = service.spawn();
        (service, handle)
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let (_service, handle) = service_with(StubResolver::new(vec![]));
        let response = handle.request(PageRequest::Ping).await.unwrap();
        assert_eq!(response, PageResponse::pong());
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_resolves_then_repeats_from_cache() {
        let (_service, handle) = service_with(StubResolver::answering("엄청나게 좋은 일"));

        let first = handle
            .request(PageRequest::FetchJargon {
                term: "대박".into(),
                context: String::new(),
            })
            .await
            .unwrap();
        match first {
            PageResponse::Fetched {
                ok,
                data,
                from_cache,
            } => {
                assert!(ok);
                assert!(!from_cache);
                assert_eq!(data.meaning_line, "엄청나게 좋은 일");
            }
            other => panic!("expected Fetched, got {other:?}"),
        }

        // stub has no second answer; only the cache can satisfy this
        let second = handle
            .request(PageRequest::FetchJargon {
                term: "대박".into(),
                context: String::new(),
            })
            .await
            .unwrap();
        match second {
            PageResponse::Fetched { from_cache, .. } => assert!(from_cache),
            other => panic!("expected Fetched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_the_error_string() {
        use crate::lookup::resolver::ResolveError;
        let (_service, handle) = service_with(StubResolver::new(vec![Err(ResolveError::Timeout)]));

        let response = handle
            .request(PageRequest::FetchJargon {
                term: "느림보".into(),
                context: String::new(),
            })
            .await
            .unwrap();
        match response {
            PageResponse::Failed { ok, error } => {
                assert!(!ok);
                assert_eq!(error, "interpretation request timed out");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dead_service_yields_no_response() {
        let (tx, rx) = mpsc::channel::<Envelope>(1);
        drop(rx);
        let handle = BackgroundHandle { tx };
        let err = handle.request(PageRequest::Ping).await.unwrap_err();
        assert!(matches!(err, RequestError::NoResponse));
        assert_eq!(err.to_string(), "no response from background");
    }

    #[tokio::test]
    async fn test_cache_write_back_broadcasts_to_pages() {
        let (service, handle) = service_with(StubResolver::answering("새로운 뜻"));
        let mut rx = service.tabs().register(3);

        let _ = handle
            .request(PageRequest::FetchJargon {
                term: "신조어".into(),
                context: String::new(),
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Broadcast::CacheUpdated { key, entry }) => {
                assert_eq!(key, "신조어::noctx");
                assert_eq!(entry.meaning_line, "새로운 뜻");
            }
            other => panic!("expected CacheUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_navigation_clears_only_web_pages() {
        let (service, _handle) = service_with(StubResolver::new(vec![]));
        let mut rx = service.tabs().register(5);

        service.navigation_committed(5, "chrome://settings");
        service.navigation_committed(5, "about:blank");
        assert!(rx.try_recv().is_err());

        service.navigation_committed(5, "https://example.com/a");
        assert_eq!(rx.try_recv().unwrap(), Broadcast::ClearTip);

        service.history_state_updated(5, "http://example.com/spa#route");
        assert_eq!(rx.try_recv().unwrap(), Broadcast::ClearTip);
    }

    #[tokio::test]
    async fn test_activation_flag_defaults_off_and_broadcasts_on_change() {
        let (service, _handle) = service_with(StubResolver::new(vec![]));
        assert!(!service.is_active().unwrap());

        let mut rx = service.tabs().register(9);
        service.set_active(true).unwrap();
        assert!(service.is_active().unwrap());
        assert_eq!(
            rx.try_recv().unwrap(),
            Broadcast::Toggle { is_active: true }
        );
    }
}
