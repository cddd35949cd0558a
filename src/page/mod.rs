//! Page execution context.
//!
//! Mirrors what runs inside a single page: watches the selection, scans it
//! against the built-in detection set, asks the background service about
//! anything unknown, and drives a tooltip surface. One tokio task per page
//! owns all of that state; the embedding runtime feeds it [`PageEvent`]s and
//! receives [`PageNotice`]s for transient user-facing messages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::background::{BackgroundHandle, RequestError};
use crate::cancel::LookupGeneration;
use crate::lookup::dictionary::DictionaryEntry;
use crate::lookup::fingerprint;
use crate::protocol::{Broadcast, PageRequest, PageResponse};
use crate::tabs::{TabId, TabRegistry};

pub mod detect;
pub mod placement;
pub mod tooltip;

use detect::{default_detection_terms, surrounding_sentence, TermScanner};
use placement::{anchor_point, Point, Rect, Viewport};
use tooltip::{TooltipPresenter, TooltipSurface};

/// How long transient notices ask to stay up.
pub const NOTICE_DISMISS: Duration = Duration::from_secs(3);
/// Shown while a remote interpretation is in flight.
pub const LOADING_NOTICE: &str = "AI 해석 중... 잠시만 기다려주세요.";
/// Stands in for an empty meaning line.
pub const EMPTY_MEANING: &str = "해석 없음";

/// Tuning knobs for one page context.
#[derive(Clone)]
pub struct PageConfig {
    /// Probe the background once on startup.
    pub ping_on_connect: bool,
    /// Terms the page resolves without a background round-trip.
    pub detection_terms: Vec<DictionaryEntry>,
    /// Repeat selections of the same text inside this window are folded.
    pub debounce_window: Duration,
    /// Dismiss the tooltip on its own after this long, when set.
    pub auto_hide: Option<Duration>,
    /// Honor the user-facing activation flag instead of always being on.
    pub respect_active_toggle: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            ping_on_connect: true,
            detection_terms: default_detection_terms(),
            debounce_window: Duration::from_secs(1),
            auto_hide: None,
            respect_active_toggle: false,
        }
    }
}

/// Input from the embedding runtime, in DOM-event terms.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// The user finished selecting text. `surrounding` is the text of the
    /// node the selection lives in, used for sentence context.
    SelectionChanged {
        text: String,
        rect: Option<Rect>,
        surrounding: String,
    },
    /// The selection collapsed to nothing.
    SelectionCleared,
    PointerMoved { x: f64, y: f64 },
    ViewportChanged(Viewport),
    /// A click that did not start a new selection.
    Clicked,
}

/// Transient user-facing message (loading and failure states).
#[derive(Debug, Clone, PartialEq)]
pub struct PageNotice {
    pub message: String,
    pub dismiss_after: Option<Duration>,
}

/// Endpoint the embedding runtime holds to feed a page context.
#[derive(Clone)]
pub struct PageHandle {
    events: mpsc::UnboundedSender<PageEvent>,
}

impl PageHandle {
    /// False when the page context is gone.
    pub fn send(&self, event: PageEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// What one background round-trip came back with.
struct LookupReply {
    generation: u64,
    term: String,
    key: String,
    outcome: Result<PageResponse, RequestError>,
}

/// Start a page context. Registers `tab` for broadcasts, spawns the event
/// loop, and hands back the event endpoint plus the notice stream.
pub fn spawn_page(
    tab: TabId,
    config: PageConfig,
    background: BackgroundHandle,
    tabs: &TabRegistry,
    make_surface: impl FnMut() -> Box<dyn TooltipSurface> + Send + 'static,
    viewport: Viewport,
    initial_active: bool,
) -> (PageHandle, mpsc::UnboundedReceiver<PageNotice>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let broadcasts = tabs.register(tab);

    let scanner = TermScanner::new(&config.detection_terms);
    let context = PageContext {
        tab,
        config,
        background,
        scanner,
        presenter: TooltipPresenter::new(make_surface),
        viewport,
        pointer: Point { x: 0.0, y: 0.0 },
        selection_rect: None,
        current_selection: String::new(),
        last_selected: String::new(),
        last_process_at: None,
        active: initial_active,
        generations: Arc::new(LookupGeneration::new()),
        results_tx,
        notices: notices_tx,
        hide_at: None,
    };
    tokio::spawn(context.run(events_rx, broadcasts, results_rx));

    (PageHandle { events: events_tx }, notices_rx)
}

struct PageContext {
    tab: TabId,
    config: PageConfig,
    background: BackgroundHandle,
    scanner: TermScanner,
    presenter: TooltipPresenter,
    viewport: Viewport,
    pointer: Point,
    selection_rect: Option<Rect>,
    current_selection: String,
    last_selected: String,
    last_process_at: Option<Instant>,
    active: bool,
    generations: Arc<LookupGeneration>,
    results_tx: mpsc::UnboundedSender<LookupReply>,
    notices: mpsc::UnboundedSender<PageNotice>,
    hide_at: Option<tokio::time::Instant>,
}

impl PageContext {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<PageEvent>,
        mut broadcasts: mpsc::UnboundedReceiver<Broadcast>,
        mut results: mpsc::UnboundedReceiver<LookupReply>,
    ) {
        info!(tab = self.tab, "page context loop started");

        if self.config.ping_on_connect {
            match self.background.request(PageRequest::Ping).await {
                Ok(reply) if reply.is_ok() => debug!(tab = self.tab, "background answered ping"),
                Ok(_) | Err(_) => warn!(tab = self.tab, "background did not answer ping"),
            }
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                broadcast = broadcasts.recv() => match broadcast {
                    Some(broadcast) => self.handle_broadcast(broadcast),
                    None => break,
                },
                reply = results.recv() => {
                    // self holds a sender clone, so this arm never closes
                    if let Some(reply) = reply {
                        self.handle_reply(reply);
                    }
                },
                _ = maybe_sleep(self.hide_at) => {
                    self.hide_at = None;
                    self.presenter.hide();
                    debug!(tab = self.tab, "tooltip auto hidden");
                },
            }
        }

        info!(tab = self.tab, "page context loop exiting");
    }

    fn handle_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::SelectionChanged {
                text,
                rect,
                surrounding,
            } => self.selection_changed(text, rect, surrounding),
            PageEvent::SelectionCleared => {
                self.current_selection.clear();
                self.selection_rect = None;
                self.dismiss();
            }
            PageEvent::PointerMoved { x, y } => {
                self.pointer = Point { x, y };
            }
            PageEvent::ViewportChanged(viewport) => {
                self.viewport = viewport;
            }
            PageEvent::Clicked => {
                if self.current_selection.is_empty() && self.presenter.is_visible() {
                    self.dismiss();
                }
            }
        }
    }

    fn selection_changed(&mut self, text: String, rect: Option<Rect>, surrounding: String) {
        let selected = text.trim().to_string();
        self.current_selection = selected.clone();
        self.selection_rect = rect;

        if selected.is_empty() {
            return;
        }
        if self.config.respect_active_toggle && !self.active {
            debug!(tab = self.tab, "selection ignored while inactive");
            return;
        }

        // reselecting the same text while the tooltip is up is noise
        if selected == self.last_selected && self.presenter.is_visible() {
            if let Some(at) = self.last_process_at {
                if at.elapsed() < self.config.debounce_window {
                    debug!(tab = self.tab, "repeat selection debounced");
                    return;
                }
            }
        }
        self.last_selected = selected.clone();
        self.last_process_at = Some(Instant::now());

        // known terms render straight off the page, no round-trip
        let matches = self.scanner.scan(&selected);
        if !matches.is_empty() {
            let content = matches
                .iter()
                .map(|m| format!("{}: {}", m.term, m.meaning_line))
                .collect::<Vec<_>>()
                .join("\n");
            self.generations.advance();
            self.show(&content, None);
            info!(tab = self.tab, terms = matches.len(), "tooltip served by page scan");
            return;
        }

        let context = surrounding_sentence(&surrounding, &selected);
        self.notify(LOADING_NOTICE.to_string(), Some(NOTICE_DISMISS));
        self.begin_lookup(selected, context);
    }

    /// Dispatch one background lookup as its own task, so the event loop
    /// keeps processing input while the answer is in flight.
    fn begin_lookup(&mut self, term: String, context: String) {
        let (token, generation) = self.generations.advance();
        let key = fingerprint::cache_key(&term, &context);
        let request = PageRequest::FetchJargon {
            term: term.clone(),
            context,
        };
        let background = self.background.clone();
        let results = self.results_tx.clone();
        debug!(tab = self.tab, term = %term, generation, "lookup dispatched");
        tokio::spawn(async move {
            tokio::select! {
                outcome = background.request(request) => {
                    let _ = results.send(LookupReply {
                        generation,
                        term,
                        key,
                        outcome,
                    });
                }
                _ = token.cancelled() => {}
            }
        });
    }

    fn handle_reply(&mut self, reply: LookupReply) {
        if !self.generations.is_current(reply.generation) {
            debug!(tab = self.tab, term = %reply.term, "stale lookup reply dropped");
            return;
        }
        match reply.outcome {
            Ok(PageResponse::Fetched { data, .. }) => {
                let line = if data.meaning_line.is_empty() {
                    EMPTY_MEANING.to_string()
                } else {
                    data.meaning_line
                };
                let content = format!("{}: {line}", reply.term);
                self.show(&content, Some(reply.key));
            }
            Ok(PageResponse::Failed { error, .. }) => {
                self.lookup_failed(&reply.term, &error);
            }
            Ok(PageResponse::Pong { .. }) => {
                warn!(tab = self.tab, term = %reply.term, "pong where an interpretation was expected");
            }
            Err(e) => {
                self.lookup_failed(&reply.term, &e.to_string());
            }
        }
    }

    fn handle_broadcast(&mut self, broadcast: Broadcast) {
        match broadcast {
            Broadcast::CacheUpdated { key, entry } => {
                let term = key.rsplit_once("::").map(|(t, _)| t).unwrap_or(key.as_str());
                let line = if entry.meaning_line.is_empty() {
                    EMPTY_MEANING
                } else {
                    entry.meaning_line.as_str()
                };
                let content = format!("{term}: {line}");
                if self.presenter.refresh(&key, &content, &self.viewport) {
                    debug!(tab = self.tab, key = %key, "tooltip refreshed in place");
                }
            }
            Broadcast::ClearTip => self.dismiss(),
            Broadcast::Toggle { is_active } => {
                self.active = is_active;
                if !is_active {
                    self.dismiss();
                }
                debug!(tab = self.tab, is_active, "activation flag applied");
            }
        }
    }

    fn show(&mut self, content: &str, key: Option<String>) {
        let anchor = anchor_point(self.selection_rect, self.pointer);
        self.presenter.show(content, anchor, &self.viewport, key);
        self.hide_at = self
            .config
            .auto_hide
            .map(|after| tokio::time::Instant::now() + after);
    }

    /// Hide the tooltip and invalidate any in-flight lookup.
    fn dismiss(&mut self) {
        self.generations.advance();
        self.hide_at = None;
        self.presenter.hide();
    }

    fn lookup_failed(&self, term: &str, error: &str) {
        warn!(tab = self.tab, term = %term, error = %error, "lookup failed");
        self.notify(
            format!("'{term}'에 대한 해석을 가져오지 못했습니다. ({error})"),
            Some(NOTICE_DISMISS),
        );
    }

    fn notify(&self, message: String, dismiss_after: Option<Duration>) {
        let _ = self.notices.send(PageNotice {
            message,
            dismiss_after,
        });
    }
}

async fn maybe_sleep(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
