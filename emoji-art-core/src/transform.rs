//! Canvas transform rules.
//!
//! Everything here is a pure function of its arguments. The committed
//! ("steady") pan and zoom live on the document; the transient gesture
//! deltas live in a [`GestureState`] while a gesture is active. The two are
//! only combined at read time, here.

use std::collections::HashSet;

use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};

use crate::geometry::{center_of, is_positive, ScaleOffset};
use crate::model::{EmojiId, EmojiPlacement};

/// What an in-flight pan or pinch manipulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum GestureTarget {
    /// The whole canvas: steady pan and zoom.
    Canvas,
    /// The selected emoji as a group, or just the lone mover.
    Selection {
        /// The emoji the drag started on, if it started on one.
        anchor: Option<EmojiId>,
    },
}

/// Transient state of an active gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureState {
    /// Decided once, when the gesture begins.
    pub target: GestureTarget,
    /// Pan so far, in document units.
    pub pan_delta: Vec2,
    /// Pinch scale so far (1.0 = unchanged).
    pub zoom_delta: f64,
}

impl GestureState {
    /// A gesture that has not moved yet.
    #[must_use]
    pub const fn new(target: GestureTarget) -> Self {
        Self {
            target,
            pan_delta: Vec2::ZERO,
            zoom_delta: 1.0,
        }
    }
}

/// Steady pan/zoom plus the current gesture deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Committed pan, in document units.
    pub steady_pan: Vec2,
    /// Committed zoom factor.
    pub steady_zoom: f64,
    /// In-flight pan, in document units.
    pub gesture_pan: Vec2,
    /// In-flight pinch scale.
    pub gesture_zoom: f64,
}

impl ViewTransform {
    /// A view with no gesture in progress.
    #[must_use]
    pub const fn steady(pan: Vec2, zoom: f64) -> Self {
        Self {
            steady_pan: pan,
            steady_zoom: zoom,
            gesture_pan: Vec2::ZERO,
            gesture_zoom: 1.0,
        }
    }

    /// Zoom applied to something the gesture does or does not affect.
    #[must_use]
    pub fn effective_zoom(&self, affected: bool) -> f64 {
        if affected {
            self.steady_zoom * self.gesture_zoom
        } else {
            self.steady_zoom
        }
    }

    /// Document-to-screen mapping for something the gesture does or does not
    /// affect, inside a viewport of `viewport` size.
    #[must_use]
    pub fn to_screen(&self, affected: bool, viewport: Size) -> ScaleOffset {
        let zoom = self.effective_zoom(affected);
        let pan = if affected {
            self.steady_pan + self.gesture_pan
        } else {
            self.steady_pan
        };
        ScaleOffset::new(zoom, center_of(viewport) + pan * zoom)
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::steady(Vec2::ZERO, 1.0)
    }
}

/// Where a placement appears on screen.
#[must_use]
pub fn screen_position(
    placement: &EmojiPlacement,
    view: &ViewTransform,
    affected: bool,
    viewport: Size,
) -> Point {
    view.to_screen(affected, viewport).apply(placement.location())
}

/// Rendered font size of a placement.
#[must_use]
pub fn font_size(placement: &EmojiPlacement, view: &ViewTransform, affected: bool) -> f64 {
    f64::from(placement.size) * view.effective_zoom(affected)
}

/// The document coordinate under a screen point, using steady state only.
///
/// Returns `None` if the zoom is zero or not finite.
#[must_use]
pub fn document_point(
    screen: Point,
    viewport: Size,
    steady_pan: Vec2,
    steady_zoom: f64,
) -> Option<Point> {
    ViewTransform::steady(steady_pan, steady_zoom)
        .to_screen(false, viewport)
        .invert(screen)
}

/// Zoom and pan that fit `image` inside `viewport`.
///
/// Returns `None`, meaning "keep the current zoom and pan", when there is
/// no image or either size has a non-positive dimension.
#[must_use]
pub fn zoom_to_fit(image: Option<Size>, viewport: Size) -> Option<(f64, Vec2)> {
    let image = image?;
    if !is_positive(image) || !is_positive(viewport) {
        return None;
    }
    let h_zoom = viewport.width / image.width;
    let v_zoom = viewport.height / image.height;
    Some((h_zoom.min(v_zoom), Vec2::ZERO))
}

/// Pick the target of a canvas-wide pan or pinch.
///
/// With nothing selected the gesture moves the canvas; otherwise it moves
/// the selection.
#[must_use]
pub fn gesture_target(selection_is_empty: bool) -> GestureTarget {
    if selection_is_empty {
        GestureTarget::Canvas
    } else {
        GestureTarget::Selection { anchor: None }
    }
}

/// Whether the active gesture moves this placement.
#[must_use]
pub fn is_affected(
    id: EmojiId,
    gesture: Option<&GestureState>,
    selection: &HashSet<EmojiId>,
    lone_mover: Option<EmojiId>,
) -> bool {
    match gesture.map(|g| g.target) {
        None => false,
        Some(GestureTarget::Canvas) => true,
        Some(GestureTarget::Selection { anchor }) => match lone_drag(anchor, lone_mover) {
            Some(lone) => lone == id,
            None => selection.contains(&id),
        },
    }
}

/// The placement a selection gesture moves on its own.
///
/// Only a lone mover the drag started on counts; any other lone mover is
/// ignored and the selection moves as a group.
#[must_use]
pub fn lone_drag(anchor: Option<EmojiId>, lone_mover: Option<EmojiId>) -> Option<EmojiId> {
    lone_mover.filter(|lone| anchor == Some(*lone))
}
