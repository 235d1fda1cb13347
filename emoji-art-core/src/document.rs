//! Per-document editing session.
//!
//! A [`DocumentState`] owns one [`EmojiArtModel`] together with everything a
//! renderer needs around it: selection, the lone mover, steady pan/zoom, the
//! active gesture and the background image. All mutation goes through the
//! intent methods; every model change is written back to storage and
//! published to subscribers.

use std::collections::HashSet;
use std::sync::Arc;

use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::background::{BackgroundFetcher, BackgroundImage, BackgroundStatus};
use crate::event::{ChangeKind, DocumentEvent, Notifier};
use crate::geometry::{integer_offset, round_half_even};
use crate::model::{BackgroundRef, EmojiArtModel, EmojiId, EmojiPlacement};
use crate::storage::{Storage, StorageLocation};
use crate::transform::{self, GestureState, GestureTarget, ViewTransform};

/// Unique identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Create a new unique document ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a document ID from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Key used for this document in keyed storage.
    #[must_use]
    pub fn storage_key(&self) -> String {
        self.0.to_string()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An open emoji art document.
#[derive(Debug)]
pub struct DocumentState {
    id: DocumentId,
    model: EmojiArtModel,
    display_name: Option<String>,
    location: StorageLocation,
    storage: Arc<dyn Storage>,
    background: BackgroundFetcher,
    selection: HashSet<EmojiId>,
    lone_mover: Option<EmojiId>,
    steady_pan: Vec2,
    steady_zoom: f64,
    gesture: Option<GestureState>,
    default_emoji_size: u32,
    persistence_failures: u64,
    notifier: Notifier,
}

impl DocumentState {
    /// Open a session over `model`.
    ///
    /// Starts fetching the model's background, if it has one.
    pub(crate) fn open(
        id: DocumentId,
        model: EmojiArtModel,
        location: StorageLocation,
        storage: Arc<dyn Storage>,
        background: BackgroundFetcher,
        default_emoji_size: u32,
    ) -> Self {
        let mut document = Self {
            id,
            model,
            display_name: None,
            location,
            storage,
            background,
            selection: HashSet::new(),
            lone_mover: None,
            steady_pan: Vec2::ZERO,
            steady_zoom: 1.0,
            gesture: None,
            default_emoji_size,
            persistence_failures: 0,
            notifier: Notifier::new(id),
        };
        let reference = document.model.background_reference().cloned();
        document.background.start(reference, &document.notifier);
        document
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    /// Stable identity.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// The current model.
    #[must_use]
    pub fn model(&self) -> &EmojiArtModel {
        &self.model
    }

    /// Placements in draw order.
    #[must_use]
    pub fn placements(&self) -> &[EmojiPlacement] {
        self.model.placements()
    }

    /// Display name assigned by the owning store.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub(crate) fn set_display_name(&mut self, name: String) {
        self.display_name = Some(name);
    }

    /// Where the model persists.
    #[must_use]
    pub fn storage_location(&self) -> &StorageLocation {
        &self.location
    }

    /// The current background reference.
    #[must_use]
    pub fn background_reference(&self) -> Option<&BackgroundRef> {
        self.model.background_reference()
    }

    /// The decoded background, once it has arrived for the current reference.
    #[must_use]
    pub fn background_image(&self) -> Option<Arc<BackgroundImage>> {
        self.background.image()
    }

    /// Load status of the background.
    #[must_use]
    pub fn background_status(&self) -> BackgroundStatus {
        self.background.status()
    }

    /// Whether a background is set but not yet decoded.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.background_status() == BackgroundStatus::Loading
    }

    /// Selected placement IDs.
    #[must_use]
    pub fn selection(&self) -> &HashSet<EmojiId> {
        &self.selection
    }

    /// The placement exempt from group movement during the current drag.
    #[must_use]
    pub fn lone_mover(&self) -> Option<EmojiId> {
        self.lone_mover
    }

    /// Committed pan, in document units.
    #[must_use]
    pub fn steady_pan(&self) -> Vec2 {
        self.steady_pan
    }

    /// Committed zoom factor.
    #[must_use]
    pub fn steady_zoom(&self) -> f64 {
        self.steady_zoom
    }

    /// The active gesture, if any.
    #[must_use]
    pub fn gesture(&self) -> Option<&GestureState> {
        self.gesture.as_ref()
    }

    /// Steady state combined with the active gesture's deltas.
    #[must_use]
    pub fn view_transform(&self) -> ViewTransform {
        let mut view = ViewTransform::steady(self.steady_pan, self.steady_zoom);
        if let Some(gesture) = &self.gesture {
            view.gesture_pan = gesture.pan_delta;
            view.gesture_zoom = gesture.zoom_delta;
        }
        view
    }

    /// Whether the active gesture moves this placement.
    #[must_use]
    pub fn is_affected_by_gesture(&self, id: EmojiId) -> bool {
        transform::is_affected(id, self.gesture.as_ref(), &self.selection, self.lone_mover)
    }

    /// Whether the active gesture moves the canvas and its background.
    #[must_use]
    pub fn is_canvas_gesture(&self) -> bool {
        matches!(
            self.gesture.map(|g| g.target),
            Some(GestureTarget::Canvas)
        )
    }

    /// On-screen position of a placement, including any gesture in flight.
    #[must_use]
    pub fn screen_position(&self, id: EmojiId, viewport: Size) -> Option<Point> {
        let placement = self.model.placement(id)?;
        let affected = self.is_affected_by_gesture(id);
        Some(transform::screen_position(
            placement,
            &self.view_transform(),
            affected,
            viewport,
        ))
    }

    /// How many model writes have failed since the session opened.
    #[must_use]
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures
    }

    /// Subscribe to change notifications. Drop the receiver to unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.notifier.subscribe()
    }

    // -----------------------------------------------------------------------
    // Selection intents
    // -----------------------------------------------------------------------

    /// Whether `id` is selected.
    #[must_use]
    pub fn is_selected(&self, id: EmojiId) -> bool {
        self.selection.contains(&id)
    }

    /// Select `id` if it is not selected, deselect it if it is.
    ///
    /// IDs that are not in the document cannot be selected.
    pub fn toggle_selection(&mut self, id: EmojiId) {
        if !self.selection.remove(&id) {
            if self.model.placement(id).is_none() {
                return;
            }
            self.selection.insert(id);
        }
        self.notifier.notify(ChangeKind::Selection);
    }

    /// Deselect everything.
    pub fn clear_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        self.selection.clear();
        self.notifier.notify(ChangeKind::Selection);
    }

    /// A tap on empty canvas deselects everything.
    pub fn on_background_tap(&mut self) {
        self.clear_selection();
    }

    /// A drag is starting on `id`.
    ///
    /// If `id` is not selected it becomes the lone mover, so the drag moves
    /// only it and not the selection.
    pub fn mark_lone_mover_candidate(&mut self, id: EmojiId) {
        if self.selection.contains(&id) {
            return;
        }
        self.lone_mover = Some(id);
        self.notifier.notify(ChangeKind::Selection);
    }

    // -----------------------------------------------------------------------
    // Model intents
    // -----------------------------------------------------------------------

    /// Place a new emoji at a document-space point.
    pub fn add_emoji(&mut self, text: impl Into<String>, at: Point, size: u32) -> EmojiId {
        let id = self
            .model
            .add_emoji(text, round_half_even(at.x), round_half_even(at.y), size);
        tracing::debug!(document = %self.id, emoji = %id, "Added emoji");
        self.model_changed();
        id
    }

    /// Place a new emoji dropped at a screen point, at the default size.
    ///
    /// Returns `None` if the current zoom cannot be inverted.
    pub fn drop_emoji(
        &mut self,
        text: impl Into<String>,
        screen: Point,
        viewport: Size,
    ) -> Option<EmojiId> {
        let at = transform::document_point(screen, viewport, self.steady_pan, self.steady_zoom)?;
        Some(self.add_emoji(text, at, self.default_emoji_size))
    }

    /// Remove an emoji and drop it from the selection.
    pub fn delete_emoji(&mut self, id: EmojiId) {
        let deselected = self.selection.remove(&id);
        if self.lone_mover == Some(id) {
            self.lone_mover = None;
        }
        if deselected {
            self.notifier.notify(ChangeKind::Selection);
        }
        if self.model.remove_placement(id).is_some() {
            tracing::debug!(document = %self.id, emoji = %id, "Deleted emoji");
            self.model_changed();
        }
    }

    /// Move one emoji by a document-space vector, rounded to whole units.
    pub fn move_emoji(&mut self, id: EmojiId, by: Vec2) {
        if self.offset_placement(id, by) {
            self.model_changed();
        }
    }

    /// Move the selection, or just the lone mover when the drag started on it.
    pub fn move_selected(&mut self, by: Vec2, anchor: Option<EmojiId>) {
        if let Some(lone) = transform::lone_drag(anchor, self.lone_mover) {
            let moved = self.offset_placement(lone, by);
            self.lone_mover = None;
            self.notifier.notify(ChangeKind::Selection);
            if moved {
                self.model_changed();
            }
            return;
        }

        let ids: Vec<EmojiId> = self.selection.iter().copied().collect();
        let mut moved = false;
        for id in ids {
            moved |= self.offset_placement(id, by);
        }
        if moved {
            self.model_changed();
        }
    }

    /// Resize one emoji, rounding ties to even.
    ///
    /// A result that would not be a positive size keeps the old size.
    pub fn scale_emoji(&mut self, id: EmojiId, by: f64) {
        if self.scale_placement(id, by) {
            self.model_changed();
        }
    }

    /// Resize every selected emoji.
    pub fn scale_selected(&mut self, by: f64) {
        let ids: Vec<EmojiId> = self.selection.iter().copied().collect();
        let mut scaled = false;
        for id in ids {
            scaled |= self.scale_placement(id, by);
        }
        if scaled {
            self.model_changed();
        }
    }

    /// Replace the background reference and start fetching it.
    ///
    /// The previous image is cleared immediately.
    pub fn set_background_reference(&mut self, reference: Option<BackgroundRef>) {
        tracing::debug!(
            document = %self.id,
            "Background reference -> {}",
            reference.as_ref().map_or("none", BackgroundRef::as_str)
        );
        self.model.set_background_reference(reference.clone());
        self.model_changed();
        self.background.start(reference, &self.notifier);
        self.notifier.notify(ChangeKind::Background);
    }

    // -----------------------------------------------------------------------
    // Viewport intents
    // -----------------------------------------------------------------------

    /// Fit the background inside `viewport` and reset the pan.
    ///
    /// Returns `false`, leaving zoom and pan alone, when there is no usable
    /// background image.
    pub fn zoom_to_fit(&mut self, viewport: Size) -> bool {
        let image = self.background.image().map(|img| img.size());
        let Some((zoom, pan)) = transform::zoom_to_fit(image, viewport) else {
            return false;
        };
        self.steady_zoom = zoom;
        self.steady_pan = pan;
        self.notifier.notify(ChangeKind::Viewport);
        true
    }

    // -----------------------------------------------------------------------
    // Gestures
    // -----------------------------------------------------------------------

    /// Begin a pan or pinch on the canvas.
    ///
    /// The target is fixed now: the canvas when nothing is selected, the
    /// selection otherwise. Any unfinished gesture is discarded.
    pub fn begin_gesture(&mut self) -> GestureTarget {
        self.release_lone_mover();
        let target = transform::gesture_target(self.selection.is_empty());
        self.start_gesture(target);
        target
    }

    /// Begin dragging a specific emoji.
    ///
    /// An unselected emoji becomes the lone mover and is the only thing the
    /// drag moves or scales.
    pub fn begin_emoji_drag(&mut self, id: EmojiId) -> GestureTarget {
        self.release_lone_mover();
        self.mark_lone_mover_candidate(id);
        let target = GestureTarget::Selection { anchor: Some(id) };
        self.start_gesture(target);
        target
    }

    /// Report the total screen-space translation of the active gesture.
    pub fn update_gesture_pan(&mut self, translation: Vec2) {
        let zoom = self.steady_zoom;
        if let Some(gesture) = &mut self.gesture {
            if zoom != 0.0 && zoom.is_finite() {
                gesture.pan_delta = translation / zoom;
                self.notifier.notify(ChangeKind::Gesture);
            }
        }
    }

    /// Report the total pinch scale of the active gesture.
    pub fn update_gesture_zoom(&mut self, scale: f64) {
        if let Some(gesture) = &mut self.gesture {
            if scale > 0.0 && scale.is_finite() {
                gesture.zoom_delta = scale;
                self.notifier.notify(ChangeKind::Gesture);
            }
        }
    }

    /// Finish the active gesture, committing its deltas exactly once.
    pub fn end_gesture(&mut self) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        match gesture.target {
            GestureTarget::Canvas => {
                self.steady_pan += gesture.pan_delta;
                self.steady_zoom *= gesture.zoom_delta;
                self.notifier.notify(ChangeKind::Viewport);
            }
            GestureTarget::Selection { anchor } => {
                if (gesture.zoom_delta - 1.0).abs() > f64::EPSILON {
                    match transform::lone_drag(anchor, self.lone_mover) {
                        Some(lone) => self.scale_emoji(lone, gesture.zoom_delta),
                        None => self.scale_selected(gesture.zoom_delta),
                    }
                }
                if gesture.pan_delta != Vec2::ZERO {
                    self.move_selected(gesture.pan_delta, anchor);
                }
            }
        }
        self.release_lone_mover();
        self.notifier.notify(ChangeKind::Gesture);
    }

    /// Abandon the active gesture without committing anything.
    pub fn cancel_gesture(&mut self) {
        if self.gesture.take().is_some() {
            self.release_lone_mover();
            self.notifier.notify(ChangeKind::Gesture);
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn start_gesture(&mut self, target: GestureTarget) {
        tracing::trace!(document = %self.id, ?target, "Gesture started");
        self.gesture = Some(GestureState::new(target));
        self.notifier.notify(ChangeKind::Gesture);
    }

    fn release_lone_mover(&mut self) {
        if self.lone_mover.take().is_some() {
            self.notifier.notify(ChangeKind::Selection);
        }
    }

    fn offset_placement(&mut self, id: EmojiId, by: Vec2) -> bool {
        let Some(placement) = self.model.placement_mut(id) else {
            return false;
        };
        let (dx, dy) = integer_offset(by);
        placement.x = placement.x.saturating_add(dx);
        placement.y = placement.y.saturating_add(dy);
        true
    }

    fn scale_placement(&mut self, id: EmojiId, by: f64) -> bool {
        let Some(placement) = self.model.placement_mut(id) else {
            return false;
        };
        let Some(size) = scaled_size(placement.size, by) else {
            tracing::debug!(emoji = %id, factor = by, "Ignoring scale to a non-positive size");
            return false;
        };
        placement.size = size;
        true
    }

    fn model_changed(&mut self) {
        self.persist();
        self.notifier.notify(ChangeKind::Model);
    }

    /// Write the model to its location. Failures are counted, never raised.
    pub(crate) fn persist(&mut self) {
        let bytes = match self.model.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.persistence_failures += 1;
                tracing::warn!("Failed to serialize document {}: {e}", self.id);
                return;
            }
        };
        if let Err(e) = self.location.write(self.storage.as_ref(), &bytes) {
            self.persistence_failures += 1;
            tracing::warn!(
                "Failed to persist document {} to {}: {e}",
                self.id,
                self.location
            );
        }
    }

    /// Delete the persisted model. Used by the store on removal.
    pub(crate) fn delete_persisted(&self) {
        if let Err(e) = self.location.remove(self.storage.as_ref()) {
            tracing::warn!(
                "Failed to delete document {} at {}: {e}",
                self.id,
                self.location
            );
        }
    }
}

/// `size * factor` rounded half to even, or `None` unless that is positive.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_size(size: u32, factor: f64) -> Option<u32> {
    let scaled = (f64::from(size) * factor).round_ties_even();
    if scaled >= 1.0 && scaled <= f64::from(u32::MAX) {
        Some(scaled as u32)
    } else {
        None
    }
}
