//! Euneo: Korean internet-slang tooltip engine.
//! Main library: background service wiring, page attachment, tracing setup.

pub mod background;
pub mod cancel;
pub mod lookup;
pub mod metrics;
pub mod page;
pub mod protocol;
pub mod storage;
pub mod tabs;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use background::{Background, BackgroundHandle};
use lookup::cache::JargonCache;
use lookup::dictionary::LocalDictionary;
use lookup::resolver::{HttpResolver, ResolveError, ResolverConfig};
use lookup::LookupOrchestrator;
use metrics::MetricsRegistry;
use page::placement::Viewport;
use page::tooltip::TooltipSurface;
use page::{spawn_page, PageConfig, PageHandle, PageNotice};
use storage::{Storage, StorageError};
use tabs::{TabId, TabRegistry};

/// Everything the embedding runtime holds to keep the service alive.
pub struct BackgroundContext {
    pub storage: Arc<Storage>,
    pub tabs: Arc<TabRegistry>,
    pub metrics: Arc<MetricsRegistry>,
    pub service: Arc<Background>,
    pub handle: BackgroundHandle,
}

#[derive(Debug)]
pub enum StartError {
    Storage(StorageError),
    Resolver(ResolveError),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::Storage(e) => write!(f, "storage init failed: {e}"),
            StartError::Resolver(e) => write!(f, "resolver init failed: {e}"),
        }
    }
}

impl std::error::Error for StartError {}

impl From<StorageError> for StartError {
    fn from(e: StorageError) -> Self {
        StartError::Storage(e)
    }
}

impl From<ResolveError> for StartError {
    fn from(e: ResolveError) -> Self {
        StartError::Resolver(e)
    }
}

/// Open storage, build the tier chain, and start the service loop.
///
/// A missing or unreadable dictionary asset is not fatal: the local tier
/// starts empty and every lookup falls through to cache and remote.
pub fn start_background(
    db_path: &Path,
    dictionary_asset: &Path,
    resolver_config: ResolverConfig,
) -> Result<BackgroundContext, StartError> {
    let storage = Arc::new(Storage::open(db_path)?);
    let tabs = Arc::new(TabRegistry::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let dictionary = LocalDictionary::load_once(&storage, dictionary_asset).unwrap_or_else(|e| {
        warn!(error = %e, "local dictionary unavailable, starting empty");
        LocalDictionary::empty()
    });

    let resolver = Arc::new(HttpResolver::new(resolver_config)?);
    let orchestrator = LookupOrchestrator::new(
        dictionary,
        JargonCache::new(storage.clone(), tabs.clone()),
        resolver,
        metrics.clone(),
    );

    let service = Arc::new(Background::new(
        orchestrator,
        storage.clone(),
        tabs.clone(),
        metrics.clone(),
    ));
    let handle = service.spawn();
    info!("background context ready");

    Ok(BackgroundContext {
        storage,
        tabs,
        metrics,
        service,
        handle,
    })
}

impl BackgroundContext {
    /// Attach one page: registers the tab and spawns its event loop with
    /// the persisted activation flag applied.
    pub fn attach_page(
        &self,
        tab: TabId,
        config: PageConfig,
        make_surface: impl FnMut() -> Box<dyn TooltipSurface> + Send + 'static,
        viewport: Viewport,
    ) -> (PageHandle, tokio::sync::mpsc::UnboundedReceiver<PageNotice>) {
        let active = match self.service.is_active() {
            Ok(active) => active,
            Err(e) => {
                warn!(tab, error = %e, "activation flag unreadable, assuming inactive");
                false
            }
        };
        spawn_page(
            tab,
            config,
            self.handle.clone(),
            &self.tabs,
            make_surface,
            viewport,
            active,
        )
    }
}

/// Install the tracing subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "euneo=debug".parse().unwrap()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
