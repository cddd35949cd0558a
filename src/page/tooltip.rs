//! Tooltip presentation: one surface per page, driven by the presenter.
//!
//! The embedder supplies the concrete surface (a DOM node, a native view,
//! a test double); the presenter owns its lifecycle and decides content,
//! visibility, and position. Measurement happens after content is set and
//! the surface is parked at the origin, because dimensions are unknowable
//! before layout.

use serde::Serialize;

use super::placement::{self, Point, Side, Size, Viewport};

/// Rendering surface contract.
pub trait TooltipSurface: Send {
    fn set_content(&mut self, text: &str);
    /// Current rendered dimensions. Called only while visible.
    fn measure(&mut self) -> Size;
    fn apply_position(&mut self, x: f64, y: f64, side: Side);
    fn set_visible(&mut self, visible: bool);
}

/// Snapshot of what the tooltip is showing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipState {
    pub visible: bool,
    pub anchor: Point,
    pub content: String,
}

impl TooltipState {
    fn hidden() -> Self {
        Self {
            visible: false,
            anchor: Point { x: 0.0, y: 0.0 },
            content: String::new(),
        }
    }
}

/// Owns the page's single tooltip surface.
pub struct TooltipPresenter {
    surface: Option<Box<dyn TooltipSurface>>,
    make_surface: Box<dyn FnMut() -> Box<dyn TooltipSurface> + Send>,
    state: TooltipState,
    /// Cache key behind the visible content, for in-place refreshes.
    shown_key: Option<String>,
}

impl TooltipPresenter {
    pub fn new(make_surface: impl FnMut() -> Box<dyn TooltipSurface> + Send + 'static) -> Self {
        Self {
            surface: None,
            make_surface: Box::new(make_surface),
            state: TooltipState::hidden(),
            shown_key: None,
        }
    }

    fn surface_mut(&mut self) -> &mut Box<dyn TooltipSurface> {
        if self.surface.is_none() {
            self.surface = Some((self.make_surface)());
        }
        self.surface.as_mut().expect("surface just created")
    }

    /// Show `content` anchored at `anchor`. A show while already visible
    /// supersedes the previous content on the same surface.
    pub fn show(&mut self, content: &str, anchor: Point, viewport: &Viewport, key: Option<String>) {
        self.render(content, anchor, viewport);
        self.state = TooltipState {
            visible: true,
            anchor,
            content: content.to_string(),
        };
        self.shown_key = key;
    }

    fn render(&mut self, content: &str, anchor: Point, viewport: &Viewport) {
        let surface = self.surface_mut();
        surface.set_content(content);
        surface.set_visible(true);
        // park at the origin so measure() sees post-layout dimensions
        surface.apply_position(0.0, 0.0, Side::Below);
        let size = surface.measure();
        let position = placement::resolve(anchor, size, viewport);
        surface.apply_position(position.x.round(), position.y.round(), position.side);
    }

    /// Hide the tooltip. The surface is kept for the next show.
    pub fn hide(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.set_visible(false);
        }
        self.state = TooltipState::hidden();
        self.shown_key = None;
    }

    /// Apply a cache update: when the visible tooltip was built from `key`
    /// and `content` actually changed, swap it in and re-place at the
    /// stored anchor. Returns whether anything changed.
    pub fn refresh(&mut self, key: &str, content: &str, viewport: &Viewport) -> bool {
        if !self.state.visible || self.shown_key.as_deref() != Some(key) {
            return false;
        }
        if self.state.content == content {
            return false;
        }
        let anchor = self.state.anchor;
        self.render(content, anchor, viewport);
        self.state.content = content.to_string();
        true
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    pub fn state(&self) -> &TooltipState {
        &self.state
    }
}
