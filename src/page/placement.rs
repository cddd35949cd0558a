//! Anchor derivation and viewport-aware tooltip positioning.
//!
//! Positions are computed, never discovered: given an anchor (viewport
//! coordinates), the measured tooltip size, and the viewport metrics, the
//! resolver returns the page-absolute top-left corner plus which side of
//! the anchor the tooltip ended up on. Pure functions, no surface access.

use serde::{Deserialize, Serialize};

/// Horizontal margin the tooltip keeps from either viewport edge.
const EDGE_MARGIN: f64 = 12.0;
/// Extra clearance required beyond the tooltip height before flipping above.
const FLIP_CLEARANCE: f64 = 24.0;
/// Gap between the anchor and a tooltip flipped above it.
const ABOVE_GAP: f64 = 18.0;
/// Offset below the selection rect's bottom edge.
const SELECTION_OFFSET: f64 = 10.0;
/// Offset below the pointer when no selection geometry exists.
const POINTER_OFFSET: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Selection bounding box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    /// A collapsed selection reports a zero-area rect.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

/// Measured tooltip dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Viewport dimensions plus current scroll offsets.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// Side of the anchor the tooltip was placed on (drives the arrow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Below,
    Above,
}

/// Page-absolute top-left corner for the tooltip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedPosition {
    pub x: f64,
    pub y: f64,
    pub side: Side,
}

/// Anchor for the tooltip, in viewport coordinates: below the selection
/// rect when it has extent, otherwise below the pointer.
pub fn anchor_point(selection: Option<Rect>, pointer: Point) -> Point {
    if let Some(rect) = selection {
        if !rect.is_degenerate() {
            return Point {
                x: rect.center_x(),
                y: rect.bottom() + SELECTION_OFFSET,
            };
        }
    }
    Point {
        x: pointer.x,
        y: pointer.y + POINTER_OFFSET,
    }
}

/// Resolve the final page-absolute position for a tooltip of `tip` size.
///
/// The tooltip prefers hanging below the anchor. It is clamped inside the
/// horizontal viewport band, and flips above the anchor only when the space
/// below is too short while the space above actually fits.
pub fn resolve(anchor: Point, tip: Size, viewport: &Viewport) -> ResolvedPosition {
    let mut x = anchor.x + viewport.scroll_x;
    let y = anchor.y + viewport.scroll_y;

    let right_limit = viewport.scroll_x + viewport.width;
    if x + tip.width + EDGE_MARGIN > right_limit {
        x = right_limit - tip.width - EDGE_MARGIN;
    }
    if x < viewport.scroll_x + EDGE_MARGIN {
        x = viewport.scroll_x + EDGE_MARGIN;
    }

    let space_below = (viewport.scroll_y + viewport.height) - y;
    let space_above = anchor.y;
    if space_below < tip.height + FLIP_CLEARANCE && space_above > tip.height + FLIP_CLEARANCE {
        return ResolvedPosition {
            x,
            y: anchor.y + viewport.scroll_y - tip.height - ABOVE_GAP,
            side: Side::Above,
        };
    }

    ResolvedPosition { x, y, side: Side::Below }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport {
            width: 800.0,
            height: 600.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    #[test]
    fn test_anchor_prefers_the_selection_rect() {
        let rect = Rect {
            left: 100.0,
            top: 50.0,
            width: 60.0,
            height: 20.0,
        };
        let anchor = anchor_point(Some(rect), Point { x: 0.0, y: 0.0 });
        assert_eq!(anchor, Point { x: 130.0, y: 80.0 });
    }

    #[test]
    fn test_degenerate_rect_falls_back_to_the_pointer() {
        let rect = Rect {
            left: 100.0,
            top: 50.0,
            width: 0.0,
            height: 0.0,
        };
        let anchor = anchor_point(Some(rect), Point { x: 33.0, y: 44.0 });
        assert_eq!(anchor, Point { x: 33.0, y: 56.0 });
    }

    #[test]
    fn test_no_selection_anchors_below_the_pointer() {
        let anchor = anchor_point(None, Point { x: 10.0, y: 20.0 });
        assert_eq!(anchor, Point { x: 10.0, y: 32.0 });
    }

    #[test]
    fn test_roomy_viewport_places_below_unchanged() {
        let pos = resolve(
            Point { x: 200.0, y: 100.0 },
            Size { width: 240.0, height: 80.0 },
            &viewport(),
        );
        assert_eq!(pos.side, Side::Below);
        assert_eq!((pos.x, pos.y), (200.0, 100.0));
    }

    #[test]
    fn test_right_edge_overflow_is_clamped_inside_the_margin() {
        let vp = viewport();
        let pos = resolve(
            Point { x: 780.0, y: 100.0 },
            Size { width: 200.0, height: 80.0 },
            &vp,
        );
        assert_eq!(pos.x, 588.0);
        assert!(pos.x + 200.0 <= vp.width - EDGE_MARGIN);
        assert_eq!(pos.side, Side::Below);
    }

    #[test]
    fn test_left_edge_is_clamped_to_the_margin() {
        let pos = resolve(
            Point { x: -40.0, y: 100.0 },
            Size { width: 200.0, height: 80.0 },
            &viewport(),
        );
        assert_eq!(pos.x, EDGE_MARGIN);
    }

    #[test]
    fn test_short_space_below_flips_above_the_anchor() {
        // anchor near the bottom: 50px below, 550px above
        let pos = resolve(
            Point { x: 200.0, y: 550.0 },
            Size { width: 240.0, height: 100.0 },
            &viewport(),
        );
        assert_eq!(pos.side, Side::Above);
        assert_eq!(pos.y, 550.0 - 100.0 - ABOVE_GAP);
        assert!(pos.y < 550.0);
    }

    #[test]
    fn test_no_flip_when_above_does_not_fit_either() {
        // 300px viewport: 40px below the anchor, 260px above, tip needs 280+24
        let vp = Viewport {
            width: 800.0,
            height: 300.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        };
        let pos = resolve(
            Point { x: 200.0, y: 260.0 },
            Size { width: 240.0, height: 280.0 },
            &vp,
        );
        assert_eq!(pos.side, Side::Below);
        assert_eq!(pos.y, 260.0);
    }

    #[test]
    fn test_scroll_offsets_shift_into_page_coordinates() {
        let vp = Viewport {
            width: 800.0,
            height: 600.0,
            scroll_x: 100.0,
            scroll_y: 2_000.0,
        };
        let pos = resolve(
            Point { x: 300.0, y: 200.0 },
            Size { width: 240.0, height: 80.0 },
            &vp,
        );
        assert_eq!((pos.x, pos.y), (400.0, 2_200.0));

        // clamping happens against the scrolled band, not raw viewport
        let clamped = resolve(
            Point { x: 790.0, y: 200.0 },
            Size { width: 240.0, height: 80.0 },
            &vp,
        );
        assert_eq!(clamped.x, 100.0 + 800.0 - 240.0 - EDGE_MARGIN);
    }

    #[test]
    fn test_flip_considers_viewport_space_not_page_space() {
        // scrolled far down: anchor viewport-y is 550 of 600, so it flips
        let vp = Viewport {
            width: 800.0,
            height: 600.0,
            scroll_x: 0.0,
            scroll_y: 5_000.0,
        };
        let pos = resolve(
            Point { x: 200.0, y: 550.0 },
            Size { width: 240.0, height: 100.0 },
            &vp,
        );
        assert_eq!(pos.side, Side::Above);
        assert_eq!(pos.y, 550.0 + 5_000.0 - 100.0 - ABOVE_GAP);
    }
}
