//! The emoji art document value: a background reference plus placed emoji.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Unique identifier for a placed emoji.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmojiId(Uuid);

impl EmojiId {
    /// Create a new unique emoji ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EmojiId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EmojiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EmojiId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque locator for a background image.
///
/// Search-result style links that wrap the real image in an `imgurl` query
/// parameter are unwrapped on construction, so two references to the same
/// image compare equal. Decoding applies the same unwrapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BackgroundRef(String);

impl BackgroundRef {
    /// Create a reference from a locator string.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        let locator = locator.into();
        match embedded_image_url(&locator) {
            Some(inner) => Self(inner),
            None => Self(locator),
        }
    }

    /// The locator as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackgroundRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackgroundRef {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

impl From<String> for BackgroundRef {
    fn from(locator: String) -> Self {
        Self::new(locator)
    }
}

impl From<BackgroundRef> for String {
    fn from(reference: BackgroundRef) -> Self {
        reference.0
    }
}

fn embedded_image_url(locator: &str) -> Option<String> {
    let url = Url::parse(locator).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "imgurl")
        .map(|(_, value)| value.into_owned())
}

/// One emoji placed on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiPlacement {
    /// Stable identity, never reused within a document.
    #[serde(default)]
    pub id: EmojiId,
    /// The glyph itself.
    pub text: String,
    /// Horizontal offset from the document center.
    pub x: i32,
    /// Vertical offset from the document center.
    pub y: i32,
    /// Font size in points.
    pub size: u32,
}

impl EmojiPlacement {
    /// Document-space location as a point.
    #[must_use]
    pub fn location(&self) -> kurbo::Point {
        kurbo::Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// A piece of emoji art.
///
/// Later placements draw on top of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiArtModel {
    #[serde(default)]
    background: Option<BackgroundRef>,
    #[serde(default)]
    placements: Vec<EmojiPlacement>,
}

impl EmojiArtModel {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The background reference, if any.
    #[must_use]
    pub fn background_reference(&self) -> Option<&BackgroundRef> {
        self.background.as_ref()
    }

    /// Replace the background reference. Does not fetch anything.
    pub fn set_background_reference(&mut self, reference: Option<BackgroundRef>) {
        self.background = reference;
    }

    /// All placements in draw order.
    #[must_use]
    pub fn placements(&self) -> &[EmojiPlacement] {
        &self.placements
    }

    /// Look up a placement by ID.
    #[must_use]
    pub fn placement(&self, id: EmojiId) -> Option<&EmojiPlacement> {
        self.placements.iter().find(|p| p.id == id)
    }

    pub(crate) fn placement_mut(&mut self, id: EmojiId) -> Option<&mut EmojiPlacement> {
        self.placements.iter_mut().find(|p| p.id == id)
    }

    /// Append a new placement and return its fresh ID.
    ///
    /// `text` is not validated; `size` should be positive.
    pub fn add_emoji(&mut self, text: impl Into<String>, x: i32, y: i32, size: u32) -> EmojiId {
        let id = EmojiId::new();
        self.placements.push(EmojiPlacement {
            id,
            text: text.into(),
            x,
            y,
            size,
        });
        id
    }

    /// Remove a placement. Unknown IDs are ignored.
    pub fn remove_placement(&mut self, id: EmojiId) -> Option<EmojiPlacement> {
        let index = self.placements.iter().position(|p| p.id == id)?;
        Some(self.placements.remove(index))
    }

    /// Number of placements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Whether the document has no placements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Encode the document as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a document previously produced by [`serialize`](Self::serialize).
    ///
    /// Returns `None` for malformed input. Placements missing an ID, or
    /// repeating one already seen, are given a fresh ID.
    #[must_use]
    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut model: Self = match serde_json::from_slice(bytes) {
            Ok(model) => model,
            Err(e) => {
                tracing::debug!("Discarding malformed document: {e}");
                return None;
            }
        };
        let mut seen = HashSet::with_capacity(model.placements.len());
        for placement in &mut model.placements {
            if !seen.insert(placement.id) {
                placement.id = EmojiId::new();
                seen.insert(placement.id);
            }
        }
        Some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let mut model = EmojiArtModel::new();
        assert!(model.is_empty());

        let a = model.add_emoji("🍎", 10, -20, 40);
        let b = model.add_emoji("🍎", 10, -20, 40);
        assert_ne!(a, b, "identical glyphs stay distinguishable");
        assert_eq!(model.len(), 2);

        let removed = model.remove_placement(a).expect("should remove");
        assert_eq!(removed.id, a);
        assert_eq!(model.placements()[0].id, b);

        assert!(model.remove_placement(a).is_none());
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_add_accepts_any_text() {
        let mut model = EmojiArtModel::new();
        let id = model.add_emoji("not an emoji", 0, 0, 12);
        assert_eq!(model.placement(id).map(|p| p.text.as_str()), Some("not an emoji"));
    }

    #[test]
    fn test_round_trip() {
        let mut model = EmojiArtModel::new();
        model.set_background_reference(Some(BackgroundRef::new("https://example.com/a.png")));
        model.add_emoji("🐵", -5, 7, 40);
        model.add_emoji("👨‍👩‍👧", 100, 200, 64);

        let bytes = model.serialize().expect("serialize");
        let back = EmojiArtModel::deserialize(&bytes).expect("deserialize");
        assert_eq!(back, model);
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let mut model = EmojiArtModel::new();
        model.add_emoji("⭐️", 1, 2, 3);
        assert_eq!(
            model.serialize().expect("first"),
            model.serialize().expect("second")
        );
    }

    #[test]
    fn test_malformed_input_yields_none() {
        assert!(EmojiArtModel::deserialize(b"").is_none());
        assert!(EmojiArtModel::deserialize(b"{not json").is_none());
        assert!(EmojiArtModel::deserialize(br#"{"placements": 7}"#).is_none());
    }

    #[test]
    fn test_decoding_unwraps_embedded_image_url() {
        let json = r#"{"background":"https://images.example.com/search?q=sea&imgurl=https%3A%2F%2Fcdn.example.com%2Fsea.jpg","placements":[]}"#;
        let model = EmojiArtModel::deserialize(json.as_bytes()).expect("valid");
        assert_eq!(
            model.background_reference().map(BackgroundRef::as_str),
            Some("https://cdn.example.com/sea.jpg")
        );
    }

    #[test]
    fn test_placements_without_ids_get_fresh_ones() {
        let json = r#"{"background":null,"placements":[
            {"text":"🍏","x":1,"y":2,"size":40},
            {"text":"🍏","x":1,"y":2,"size":40}
        ]}"#;
        let model = EmojiArtModel::deserialize(json.as_bytes()).expect("valid");
        assert_eq!(model.len(), 2);
        assert_ne!(model.placements()[0].id, model.placements()[1].id);
    }

    #[test]
    fn test_duplicate_ids_are_reassigned() {
        let mut model = EmojiArtModel::new();
        model.add_emoji("🏀", 0, 0, 40);
        let mut duplicated = model.clone();
        duplicated.placements.push(model.placements[0].clone());

        let bytes = duplicated.serialize().expect("serialize");
        let back = EmojiArtModel::deserialize(&bytes).expect("deserialize");
        assert_eq!(back.placements()[0].id, model.placements()[0].id);
        assert_ne!(back.placements()[0].id, back.placements()[1].id);
    }

    #[test]
    fn test_background_ref_unwraps_imgurl() {
        let wrapped = BackgroundRef::new(
            "https://images.example.com/imgres?imgurl=https%3A%2F%2Fcdn.example.com%2Fcat.jpg&w=1",
        );
        assert_eq!(wrapped.as_str(), "https://cdn.example.com/cat.jpg");

        let plain = BackgroundRef::new("/tmp/background.png");
        assert_eq!(plain.as_str(), "/tmp/background.png");
    }
}
