//! # Emoji Art Core
//!
//! Document model and editing logic for emoji art: a background image with
//! emoji glyphs placed, moved, and resized on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                DocumentStore                │
//! │  - Unique names   - Persisted index         │
//! ├─────────────────────────────────────────────┤
//! │  DocumentState   │  Background fetcher      │
//! │  - Selection     │  - Local / remote bytes  │
//! │  - Gestures      │  - Stale result discard  │
//! │  - Autosave      │                          │
//! ├─────────────────────────────────────────────┤
//! │  EmojiArtModel   │  Transforms              │
//! │  - Placements    │  - Document <-> screen   │
//! │  - JSON codec    │  - Zoom to fit           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Every mutation of a document goes through an intent on
//! [`DocumentState`]; observers learn about changes through
//! [`DocumentState::subscribe`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod background;
pub mod document;
pub mod error;
pub mod event;
pub mod geometry;
pub mod model;
pub mod palette;
pub mod storage;
pub mod store;
pub mod transform;

pub use background::{
    BackgroundFetcher, BackgroundImage, BackgroundStatus, ByteSource, DefaultSource,
    ImageDecoder, Locator, RasterDecoder,
};
pub use document::{DocumentId, DocumentState};
pub use error::{EmojiArtResult, FetchError, StorageError, StoreError};
pub use event::{ChangeKind, DocumentEvent};
pub use geometry::{Point, ScaleOffset, Size, Vec2};
pub use model::{BackgroundRef, EmojiArtModel, EmojiId, EmojiPlacement};
pub use palette::{Palette, PaletteSet};
pub use storage::{DirectoryStorage, MemoryStorage, Storage, StorageLocation};
pub use store::{DocumentStore, StoreConfig};
pub use transform::{GestureState, GestureTarget, ViewTransform};

/// Emoji Art core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
