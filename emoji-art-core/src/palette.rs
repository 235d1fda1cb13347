//! Named emoji palettes the user drags new emoji from.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// A named strip of emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    /// Display name.
    pub name: String,
    /// The emoji, concatenated.
    pub emojis: String,
}

impl Palette {
    /// Create a palette.
    #[must_use]
    pub fn new(name: impl Into<String>, emojis: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emojis: emojis.into(),
        }
    }

    /// Individual glyphs, one per user-perceived character.
    pub fn glyphs(&self) -> impl Iterator<Item = &str> {
        self.emojis.graphemes(true)
    }
}

/// An ordered, cyclic collection of palettes. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Palette>", into = "Vec<Palette>")]
pub struct PaletteSet {
    palettes: Vec<Palette>,
}

impl PaletteSet {
    /// Create a set from palettes. An empty list falls back to the defaults.
    #[must_use]
    pub fn new(palettes: Vec<Palette>) -> Self {
        if palettes.is_empty() {
            return Self::default();
        }
        Self { palettes }
    }

    /// All palettes in order.
    #[must_use]
    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    /// The palette shown when a document opens.
    #[must_use]
    pub fn default_palette(&self) -> &Palette {
        &self.palettes[0]
    }

    /// Look up a palette's name by its emoji.
    #[must_use]
    pub fn name_of(&self, emojis: &str) -> Option<&str> {
        self.palettes
            .iter()
            .find(|p| p.emojis == emojis)
            .map(|p| p.name.as_str())
    }

    /// The palette after the one holding `emojis`, wrapping around.
    ///
    /// Unknown palettes step to the first one.
    #[must_use]
    pub fn palette_after(&self, emojis: &str) -> &Palette {
        match self.position(emojis) {
            Some(i) => &self.palettes[(i + 1) % self.palettes.len()],
            None => self.default_palette(),
        }
    }

    /// The palette before the one holding `emojis`, wrapping around.
    ///
    /// Unknown palettes step to the first one.
    #[must_use]
    pub fn palette_before(&self, emojis: &str) -> &Palette {
        let len = self.palettes.len();
        match self.position(emojis) {
            Some(i) => &self.palettes[(i + len - 1) % len],
            None => self.default_palette(),
        }
    }

    fn position(&self, emojis: &str) -> Option<usize> {
        self.palettes.iter().position(|p| p.emojis == emojis)
    }
}

impl From<Vec<Palette>> for PaletteSet {
    fn from(palettes: Vec<Palette>) -> Self {
        Self::new(palettes)
    }
}

impl From<PaletteSet> for Vec<Palette> {
    fn from(set: PaletteSet) -> Self {
        set.palettes
    }
}

impl Default for PaletteSet {
    fn default() -> Self {
        Self {
            palettes: vec![
                Palette::new("Favorites", "🍏🏀❤️🌅🐤🐵"),
                Palette::new("Faces", "😀😂🥰😎🤔😴🤯🥳"),
                Palette::new("Animals", "🐶🐱🐹🐰🦊🐼🐨🐯🐸🐧🦆🦅"),
                Palette::new("Food", "🍎🍐🍊🍋🍌🍉🍇🍓🥨🍕"),
                Palette::new("Activities", "⚽️🏈⚾️🎾🏐🎳🎨🎸"),
                Palette::new("Weather", "☀️🌤⛈🌈❄️🌪🌏⭐️"),
            ],
        }
    }
}
