//! Registry of open documents.
//!
//! The [`DocumentStore`] is the only thing that creates or destroys
//! [`DocumentState`] sessions. It keeps display names unique, remembers the
//! order documents were added in, and persists that index next to the
//! documents themselves so a later [`DocumentStore::load`] restores it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::background::{BackgroundFetcher, ByteSource, DefaultSource, ImageDecoder, RasterDecoder};
use crate::document::{DocumentId, DocumentState};
use crate::error::{EmojiArtResult, StoreError};
use crate::model::EmojiArtModel;
use crate::palette::PaletteSet;
use crate::storage::{Storage, StorageLocation};

/// Default store title.
pub const DEFAULT_STORE_NAME: &str = "Emoji Art";

/// Base name for new documents.
pub const DEFAULT_UNTITLED_NAME: &str = "Untitled";

/// Font size for emoji dropped onto a document.
pub const DEFAULT_EMOJI_SIZE: u32 = 40;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store title; also namespaces the persisted index.
    pub name: String,
    /// Base for generated names ("Untitled", "Untitled 2", ...).
    pub untitled_name: String,
    /// Size given to emoji dropped without an explicit size.
    pub default_emoji_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.to_string(),
            untitled_name: DEFAULT_UNTITLED_NAME.to_string(),
            default_emoji_size: DEFAULT_EMOJI_SIZE,
        }
    }
}

impl StoreConfig {
    /// Configuration with a custom store title.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn manifest_key(&self) -> String {
        format!("EmojiArtDocumentStore.{}", self.name)
    }
}

/// One row of the persisted index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    id: DocumentId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
}

/// Owner of all open documents.
#[derive(Debug)]
pub struct DocumentStore {
    config: StoreConfig,
    storage: Arc<dyn Storage>,
    source: Arc<dyn ByteSource>,
    decoder: Arc<dyn ImageDecoder>,
    palettes: PaletteSet,
    documents: HashMap<DocumentId, DocumentState>,
    /// Document IDs in the order they were added.
    order: Vec<DocumentId>,
}

impl DocumentStore {
    /// Create an empty store persisting through `storage`.
    #[must_use]
    pub fn new(config: StoreConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            storage,
            source: Arc::new(DefaultSource::new()),
            decoder: Arc::new(RasterDecoder),
            palettes: PaletteSet::default(),
            documents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Use these collaborators to fetch and decode backgrounds.
    ///
    /// Affects documents created or loaded afterwards.
    #[must_use]
    pub fn with_background_source(
        mut self,
        source: Arc<dyn ByteSource>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        self.source = source;
        self.decoder = decoder;
        self
    }

    /// Use a custom palette set.
    #[must_use]
    pub fn with_palettes(mut self, palettes: PaletteSet) -> Self {
        self.palettes = palettes;
        self
    }

    /// Restore a store from its persisted index.
    ///
    /// A missing or malformed index yields an empty store. Documents whose
    /// data is missing or malformed open empty.
    #[must_use]
    pub fn load(config: StoreConfig, storage: Arc<dyn Storage>) -> Self {
        let mut store = Self::new(config, storage);
        store.restore();
        store
    }

    /// Re-read the persisted index into an empty store.
    ///
    /// Call after [`with_background_source`](Self::with_background_source)
    /// when loaded documents should fetch through custom collaborators.
    pub fn restore(&mut self) {
        let key = self.config.manifest_key();
        let Some(bytes) = self.storage.read(&key) else {
            tracing::debug!("No document index under {key}");
            return;
        };
        let entries: Vec<ManifestEntry> = match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Ignoring malformed document index {key}: {e}");
                return;
            }
        };
        let mut index_changed = false;
        for entry in entries {
            if self.documents.contains_key(&entry.id) {
                index_changed = true;
                continue;
            }
            let location = match entry.file {
                Some(path) => {
                    let path = canonical_path(&path);
                    if let Some(existing) = self.find_file_document(&path) {
                        tracing::warn!(
                            "Skipping document {}: {} is already open as {existing}",
                            entry.id,
                            path.display()
                        );
                        index_changed = true;
                        continue;
                    }
                    StorageLocation::File(path)
                }
                None => StorageLocation::Keyed(entry.id.storage_key()),
            };
            let model = self.read_model(&location);
            let name = self.unique_name(&entry.name);
            if name != entry.name {
                tracing::debug!("Restored \"{}\" as \"{name}\"", entry.name);
                index_changed = true;
            }
            self.insert(entry.id, model, location, name);
        }
        if index_changed {
            self.persist_manifest();
        }
        tracing::info!(
            "Loaded {} documents into store \"{}\"",
            self.order.len(),
            self.config.name
        );
    }

    /// Store title.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Emoji palettes offered to every document.
    #[must_use]
    pub fn palettes(&self) -> &PaletteSet {
        &self.palettes
    }

    /// Create a new empty document with a generated name.
    pub fn create_document(&mut self) -> DocumentId {
        let id = DocumentId::new();
        let name = self.unique_name(&self.config.untitled_name.clone());
        self.insert(
            id,
            EmojiArtModel::new(),
            StorageLocation::Keyed(id.storage_key()),
            name,
        );
        self.persist_manifest();
        id
    }

    /// Create a document seeded from serialized bytes.
    ///
    /// Malformed bytes produce an empty document.
    pub fn import_document(&mut self, bytes: &[u8]) -> DocumentId {
        let model = EmojiArtModel::deserialize(bytes).unwrap_or_default();
        let id = DocumentId::new();
        let name = self.unique_name(&self.config.untitled_name.clone());
        let document = self.insert(id, model, StorageLocation::Keyed(id.storage_key()), name);
        document.persist();
        self.persist_manifest();
        id
    }

    /// Open a document persisted at an explicit file path.
    ///
    /// Opening a path that is already open, under any spelling, returns the
    /// existing document.
    pub fn open_document(&mut self, path: impl AsRef<Path>) -> DocumentId {
        let path = canonical_path(path.as_ref());
        if let Some(existing) = self.find_file_document(&path) {
            return existing;
        }
        let location = StorageLocation::File(path.clone());

        let model = self.read_model(&location);
        let base = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map_or_else(|| self.config.untitled_name.clone(), String::from);
        let name = self.unique_name(&base);
        let id = DocumentId::new();
        self.insert(id, model, location, name);
        self.persist_manifest();
        id
    }

    /// Delete a document and its persisted data.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if `id` is not in the store.
    pub fn remove_document(&mut self, id: DocumentId) -> EmojiArtResult<()> {
        let document = self
            .documents
            .remove(&id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        self.order.retain(|other| *other != id);
        document.delete_persisted();
        tracing::info!(
            "Removed document {id} ({})",
            document.display_name().unwrap_or_default()
        );
        self.persist_manifest();
        Ok(())
    }

    /// Rename a document.
    ///
    /// Returns `false`, leaving the name unchanged, when another document
    /// already uses `name` or `id` is unknown.
    pub fn rename(&mut self, id: DocumentId, name: impl Into<String>) -> bool {
        let name = name.into();
        if !self.documents.contains_key(&id) {
            tracing::warn!("Rename of unknown document {id}");
            return false;
        }
        if self.name_in_use(&name, Some(id)) {
            tracing::debug!("Rename of {id} to \"{name}\" rejected: name in use");
            return false;
        }
        if let Some(document) = self.documents.get_mut(&id) {
            tracing::info!(
                "Renamed document {id}: \"{}\" -> \"{name}\"",
                document.display_name().unwrap_or_default()
            );
            document.set_display_name(name);
        }
        self.persist_manifest();
        true
    }

    /// `(id, name)` for every document, in the order they were added.
    #[must_use]
    pub fn list(&self) -> Vec<(DocumentId, String)> {
        self.order
            .iter()
            .filter_map(|id| {
                let document = self.documents.get(id)?;
                Some((*id, document.display_name().unwrap_or_default().to_string()))
            })
            .collect()
    }

    /// Display name of a document.
    #[must_use]
    pub fn name_of(&self, id: DocumentId) -> Option<&str> {
        self.documents.get(&id).and_then(DocumentState::display_name)
    }

    /// Look up a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if `id` is not in the store.
    pub fn document(&self, id: DocumentId) -> EmojiArtResult<&DocumentState> {
        self.documents
            .get(&id)
            .ok_or(StoreError::DocumentNotFound(id))
    }

    /// Look up a document for editing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if `id` is not in the store.
    pub fn document_mut(&mut self, id: DocumentId) -> EmojiArtResult<&mut DocumentState> {
        self.documents
            .get_mut(&id)
            .ok_or(StoreError::DocumentNotFound(id))
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn insert(
        &mut self,
        id: DocumentId,
        model: EmojiArtModel,
        location: StorageLocation,
        name: String,
    ) -> &mut DocumentState {
        let fetcher = BackgroundFetcher::new(Arc::clone(&self.source), Arc::clone(&self.decoder));
        let mut document = DocumentState::open(
            id,
            model,
            location,
            Arc::clone(&self.storage),
            fetcher,
            self.config.default_emoji_size,
        );
        tracing::info!("Opened document {id} as \"{name}\"");
        document.set_display_name(name);
        self.order.push(id);
        self.documents.entry(id).or_insert(document)
    }

    /// The open document bound to `path`, which must already be canonical.
    fn find_file_document(&self, path: &Path) -> Option<DocumentId> {
        self.order.iter().copied().find(|id| {
            self.documents.get(id).is_some_and(|d| {
                matches!(d.storage_location(), StorageLocation::File(p) if p == path)
            })
        })
    }

    fn read_model(&self, location: &StorageLocation) -> EmojiArtModel {
        location
            .read(self.storage.as_ref())
            .and_then(|bytes| EmojiArtModel::deserialize(&bytes))
            .unwrap_or_default()
    }

    fn name_in_use(&self, name: &str, except: Option<DocumentId>) -> bool {
        self.documents
            .iter()
            .any(|(id, d)| Some(*id) != except && d.display_name() == Some(name))
    }

    /// `base`, or `base 2`, `base 3`, ... whichever is free first.
    fn unique_name(&self, base: &str) -> String {
        if !self.name_in_use(base, None) {
            return base.to_string();
        }
        let mut n = 2_usize;
        loop {
            let candidate = format!("{base} {n}");
            if !self.name_in_use(&candidate, None) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Save the ordered name index. Failures are logged, never raised.
    fn persist_manifest(&self) {
        let entries: Vec<ManifestEntry> = self
            .order
            .iter()
            .filter_map(|id| self.documents.get(id))
            .map(|d| ManifestEntry {
                id: d.id(),
                name: d.display_name().unwrap_or_default().to_string(),
                file: match d.storage_location() {
                    StorageLocation::File(path) => Some(path.clone()),
                    StorageLocation::Keyed(_) => None,
                },
            })
            .collect();
        let json = match serde_json::to_vec_pretty(&entries) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize document index: {e}");
                return;
            }
        };
        let key = self.config.manifest_key();
        if let Err(e) = self.storage.write(&key, &json) {
            tracing::warn!("Failed to persist document index {key}: {e}");
        }
    }
}

/// Resolve `path` to one spelling per file.
///
/// Files that do not exist yet resolve through their parent directory; when
/// that fails too, `.` and `..` are folded lexically.
fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) {
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return parent.join(name);
        }
    }
    let mut folded = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other),
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use kurbo::Point;

    fn store() -> (DocumentStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (
            DocumentStore::new(StoreConfig::default(), storage.clone()),
            storage,
        )
    }

    fn names(store: &DocumentStore) -> Vec<String> {
        store.list().into_iter().map(|(_, name)| name).collect()
    }

    #[test]
    fn test_create_generates_unique_names() {
        let (mut store, _) = store();
        assert!(store.is_empty());
        store.create_document();
        store.create_document();
        store.create_document();
        assert_eq!(names(&store), vec!["Untitled", "Untitled 2", "Untitled 3"]);
    }

    #[test]
    fn test_generated_name_fills_gaps() {
        let (mut store, _) = store();
        let first = store.create_document();
        store.create_document();
        assert!(store.rename(first, "Sketch"));
        store.create_document();
        assert_eq!(names(&store), vec!["Sketch", "Untitled 2", "Untitled"]);
    }

    #[test]
    fn test_rename_rejection() {
        let (mut store, _) = store();
        let untitled = store.create_document();
        let sketch = store.create_document();
        assert!(store.rename(sketch, "Sketch"));

        assert!(!store.rename(sketch, "Untitled"));
        assert_eq!(store.name_of(sketch), Some("Sketch"));
        assert_eq!(store.name_of(untitled), Some("Untitled"));
    }

    #[test]
    fn test_rename_to_own_name_succeeds() {
        let (mut store, _) = store();
        let id = store.create_document();
        assert!(store.rename(id, "Untitled"));
    }

    #[test]
    fn test_rename_unknown_document_fails() {
        let (mut store, _) = store();
        assert!(!store.rename(DocumentId::new(), "Anything"));
    }

    #[test]
    fn test_remove_document() {
        let (mut store, storage) = store();
        let id = store.create_document();
        store
            .document_mut(id)
            .expect("document")
            .add_emoji("🍏", Point::ORIGIN, 40);
        assert!(storage.read(&id.storage_key()).is_some());

        store.remove_document(id).expect("remove");
        assert!(storage.read(&id.storage_key()).is_none());
        assert!(matches!(
            store.document(id),
            Err(StoreError::DocumentNotFound(missing)) if missing == id
        ));
        assert!(matches!(
            store.remove_document(id),
            Err(StoreError::DocumentNotFound(_))
        ));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_import_document() {
        let (mut store, storage) = store();
        let mut model = EmojiArtModel::new();
        model.add_emoji("🌅", 3, 4, 50);
        let bytes = model.serialize().expect("serialize");

        let id = store.import_document(&bytes);
        assert_eq!(store.document(id).expect("document").model(), &model);
        assert!(storage.read(&id.storage_key()).is_some(), "imported data persisted");

        let empty = store.import_document(b"garbage");
        assert!(store.document(empty).expect("document").model().is_empty());
        assert_eq!(names(&store), vec!["Untitled", "Untitled 2"]);
    }

    #[test]
    fn test_load_restores_names_order_and_models() {
        let storage = Arc::new(MemoryStorage::new());
        let (first, second) = {
            let mut store = DocumentStore::new(StoreConfig::default(), storage.clone());
            let first = store.create_document();
            let second = store.create_document();
            assert!(store.rename(second, "Garden"));
            store
                .document_mut(first)
                .expect("document")
                .add_emoji("🐤", Point::new(1.0, 2.0), 40);
            (first, second)
        };

        let store = DocumentStore::load(StoreConfig::default(), storage);
        assert_eq!(
            store.list(),
            vec![(first, "Untitled".to_string()), (second, "Garden".to_string())]
        );
        assert_eq!(store.document(first).expect("first").placements().len(), 1);
        assert!(store.document(second).expect("second").model().is_empty());
    }

    #[test]
    fn test_load_with_malformed_data() {
        let storage = Arc::new(MemoryStorage::new());
        let config = StoreConfig::default();
        storage
            .write(&config.manifest_key(), b"not json")
            .expect("write");
        assert!(DocumentStore::load(config.clone(), storage.clone()).is_empty());

        let id = DocumentId::new();
        let manifest = serde_json::to_vec(&vec![ManifestEntry {
            id,
            name: "Broken".into(),
            file: None,
        }])
        .expect("manifest");
        storage.write(&config.manifest_key(), &manifest).expect("write");
        storage.write(&id.storage_key(), b"{broken").expect("write");

        let store = DocumentStore::load(config, storage);
        assert_eq!(store.name_of(id), Some("Broken"));
        assert!(store.document(id).expect("document").model().is_empty());
    }

    #[test]
    fn test_stores_are_namespaced() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let mut a = DocumentStore::new(StoreConfig::named("A"), storage.clone());
            a.create_document();
        }
        assert_eq!(DocumentStore::load(StoreConfig::named("A"), storage.clone()).len(), 1);
        assert!(DocumentStore::load(StoreConfig::named("B"), storage).is_empty());
    }

    #[test]
    fn test_open_document_resolves_path_spellings() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let direct = dir.path().join("art.json");
        let roundabout = dir.path().join("sub").join("..").join("art.json");

        let (mut store, _) = store();
        let id = store.open_document(&direct);
        assert_eq!(store.open_document(&roundabout), id, "file not created yet");

        store
            .document_mut(id)
            .expect("document")
            .add_emoji("🎨", Point::ORIGIN, 40);
        assert_eq!(store.open_document(&roundabout), id, "file on disk");
        assert_eq!(store.len(), 1);
        assert_eq!(names(&store), vec!["art"]);
    }

    #[test]
    fn test_restore_skips_second_spelling_of_open_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let storage = Arc::new(MemoryStorage::new());
        let config = StoreConfig::default();
        let first = DocumentId::new();
        let manifest = serde_json::to_vec(&vec![
            ManifestEntry {
                id: first,
                name: "art".into(),
                file: Some(dir.path().join("art.json")),
            },
            ManifestEntry {
                id: DocumentId::new(),
                name: "art copy".into(),
                file: Some(dir.path().join("sub/../art.json")),
            },
        ])
        .expect("manifest");
        storage.write(&config.manifest_key(), &manifest).expect("write");

        let store = DocumentStore::load(config.clone(), storage.clone());
        assert_eq!(store.list(), vec![(first, "art".to_string())]);

        let saved: Vec<ManifestEntry> =
            serde_json::from_slice(&storage.read(&config.manifest_key()).expect("index"))
                .expect("valid index");
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn test_restore_persists_deduplicated_names() {
        let storage = Arc::new(MemoryStorage::new());
        let config = StoreConfig::default();
        let (a, b) = (DocumentId::new(), DocumentId::new());
        let manifest = serde_json::to_vec(&vec![
            ManifestEntry {
                id: a,
                name: "Sketch".into(),
                file: None,
            },
            ManifestEntry {
                id: b,
                name: "Sketch".into(),
                file: None,
            },
        ])
        .expect("manifest");
        storage.write(&config.manifest_key(), &manifest).expect("write");

        let store = DocumentStore::load(config.clone(), storage.clone());
        assert_eq!(names(&store), vec!["Sketch", "Sketch 2"]);

        let saved: Vec<ManifestEntry> =
            serde_json::from_slice(&storage.read(&config.manifest_key()).expect("index"))
                .expect("valid index");
        let saved_names: Vec<&str> = saved.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(saved_names, vec!["Sketch", "Sketch 2"]);
    }

    #[test]
    fn test_open_document_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("beach.json");
        let mut model = EmojiArtModel::new();
        model.add_emoji("🏖", 0, 0, 40);
        std::fs::write(&path, model.serialize().expect("serialize")).expect("write");

        let (mut store, storage) = store();
        let id = store.open_document(&path);
        assert_eq!(store.name_of(id), Some("beach"));
        assert_eq!(store.document(id).expect("document").model(), &model);
        assert_eq!(store.open_document(&path), id, "same file, same document");

        store
            .document_mut(id)
            .expect("document")
            .add_emoji("🦀", Point::ORIGIN, 20);
        let on_disk = EmojiArtModel::deserialize(&std::fs::read(&path).expect("read")).expect("valid");
        assert_eq!(on_disk.len(), 2);
        assert!(storage.read(&id.storage_key()).is_none());

        let reloaded = DocumentStore::load(StoreConfig::default(), storage);
        assert_eq!(reloaded.document(id).expect("document").placements().len(), 2);
    }
}
