//! Background image acquisition.
//!
//! A [`BackgroundFetcher`] turns a document's [`BackgroundRef`] into a decoded
//! [`BackgroundImage`] on a background task. Each fetch is tagged with the
//! reference it was started for, and its result is only applied while the
//! document still points at that same reference. Starting a new fetch
//! abandons the previous one: it runs to completion and its result is
//! discarded by that check.
//!
//! ```text
//! set reference ──► slot.target = R ──► spawn task(R)
//!                                         │ ByteSource::fetch(R)
//!                                         │ ImageDecoder::decode
//!                                         ▼
//!                         slot.target == R ? apply : discard
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kurbo::Size;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::FetchError;
use crate::event::{ChangeKind, Notifier};
use crate::model::BackgroundRef;

/// A decoded background image.
#[derive(Clone, PartialEq, Eq)]
pub struct BackgroundImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel).
    pub pixels: Vec<u8>,
}

impl BackgroundImage {
    /// Dimensions as a [`Size`].
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

impl std::fmt::Debug for BackgroundImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Load state of a document's background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStatus {
    /// No background reference is set.
    #[default]
    Empty,
    /// A fetch for the current reference is in flight.
    Loading,
    /// The current reference's image is decoded and available.
    Ready,
    /// The current reference could not be fetched or decoded.
    Failed,
}

/// Where a background reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A file on the local filesystem.
    File(PathBuf),
    /// An `http` or `https` URL.
    Remote(Url),
}

impl Locator {
    /// Resolve a reference.
    ///
    /// `file://` URLs and bare paths are local files, `http(s)` URLs are
    /// remote. Any other scheme is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidReference`] for unsupported references.
    pub fn resolve(reference: &BackgroundRef) -> Result<Self, FetchError> {
        let raw = reference.as_str();
        match Url::parse(raw) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Self::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(Self::File)
                    .map_err(|()| FetchError::InvalidReference(raw.to_string())),
                _ => Err(FetchError::InvalidReference(raw.to_string())),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) if !raw.trim().is_empty() => {
                Ok(Self::File(PathBuf::from(raw)))
            }
            Err(_) => Err(FetchError::InvalidReference(raw.to_string())),
        }
    }
}

/// Resolves a background reference to raw bytes.
#[async_trait]
pub trait ByteSource: Send + Sync + std::fmt::Debug {
    /// Fetch the bytes behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be read.
    async fn fetch(&self, reference: &BackgroundRef) -> Result<Vec<u8>, FetchError>;
}

/// Turns fetched bytes into an image.
pub trait ImageDecoder: Send + Sync + std::fmt::Debug {
    /// Decode `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] if the bytes are not a supported image.
    fn decode(&self, bytes: &[u8]) -> Result<BackgroundImage, FetchError>;
}

/// Reads local files and, with the `remote` feature, HTTP(S) URLs.
#[derive(Debug, Clone, Default)]
pub struct DefaultSource {
    #[cfg(feature = "remote")]
    http: reqwest::Client,
}

impl DefaultSource {
    /// Create a source with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that uses the given HTTP client.
    #[cfg(feature = "remote")]
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ByteSource for DefaultSource {
    async fn fetch(&self, reference: &BackgroundRef) -> Result<Vec<u8>, FetchError> {
        match Locator::resolve(reference)? {
            Locator::File(path) => Ok(tokio::fs::read(path).await?),
            #[cfg(feature = "remote")]
            Locator::Remote(url) => {
                let response = self.http.get(url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
            #[cfg(not(feature = "remote"))]
            Locator::Remote(url) => Err(FetchError::InvalidReference(url.to_string())),
        }
    }
}

/// Decodes PNG, JPEG and the other raster formats the `image` crate knows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<BackgroundImage, FetchError> {
        let img = image::load_from_memory(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(BackgroundImage {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// Fetch and decode one reference, off the calling task.
///
/// # Errors
///
/// Returns the first fetch or decode failure.
pub async fn load(
    source: &dyn ByteSource,
    decoder: Arc<dyn ImageDecoder>,
    reference: &BackgroundRef,
) -> Result<BackgroundImage, FetchError> {
    let bytes = source.fetch(reference).await?;
    tokio::task::spawn_blocking(move || decoder.decode(&bytes))
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))?
}

/// Shared between a document and its in-flight fetch.
#[derive(Debug, Default)]
struct BackgroundSlot {
    target: Option<BackgroundRef>,
    image: Option<Arc<BackgroundImage>>,
    status: BackgroundStatus,
}

impl BackgroundSlot {
    /// Apply a finished fetch if it still matches the current target.
    fn complete(
        &mut self,
        reference: &BackgroundRef,
        outcome: Result<BackgroundImage, FetchError>,
    ) -> bool {
        if self.target.as_ref() != Some(reference) {
            tracing::debug!("Discarding stale background for {reference}");
            return false;
        }
        match outcome {
            Ok(image) => {
                tracing::debug!(
                    "Background {reference} ready ({}x{})",
                    image.width,
                    image.height
                );
                self.image = Some(Arc::new(image));
                self.status = BackgroundStatus::Ready;
            }
            Err(e) => {
                tracing::warn!("Failed to load background {reference}: {e}");
                self.image = None;
                self.status = BackgroundStatus::Failed;
            }
        }
        true
    }
}

/// Per-document background loader. Only the newest fetch can apply.
#[derive(Debug)]
pub struct BackgroundFetcher {
    source: Arc<dyn ByteSource>,
    decoder: Arc<dyn ImageDecoder>,
    slot: Arc<Mutex<BackgroundSlot>>,
    /// Fetches not yet known to have finished. Aborted on drop.
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundFetcher {
    /// Create a fetcher over the given collaborators.
    #[must_use]
    pub fn new(source: Arc<dyn ByteSource>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            source,
            decoder,
            slot: Arc::new(Mutex::new(BackgroundSlot::default())),
            tasks: Vec::new(),
        }
    }

    /// Fetch and decode `reference` without touching any document state.
    ///
    /// Failures resolve to `None`.
    pub async fn fetch(&self, reference: &BackgroundRef) -> Option<BackgroundImage> {
        match load(self.source.as_ref(), Arc::clone(&self.decoder), reference).await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!("Background fetch for {reference} failed: {e}");
                None
            }
        }
    }

    /// Point the fetcher at a new reference.
    ///
    /// Clears the current image and, when `reference` is set, spawns a
    /// fetch for it on the current Tokio runtime. Any in-flight fetch is
    /// left to finish and its result discarded. Outside a runtime the fetch
    /// cannot start and the status becomes [`BackgroundStatus::Failed`].
    pub(crate) fn start(&mut self, reference: Option<BackgroundRef>, notifier: &Notifier) {
        {
            let mut slot = self.lock_slot();
            slot.image = None;
            slot.target.clone_from(&reference);
            slot.status = if reference.is_some() {
                BackgroundStatus::Loading
            } else {
                BackgroundStatus::Empty
            };
        }

        let Some(reference) = reference else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; cannot fetch background {reference}");
            self.lock_slot().status = BackgroundStatus::Failed;
            return;
        };

        tracing::debug!("Fetching background {reference}");
        let source = Arc::clone(&self.source);
        let decoder = Arc::clone(&self.decoder);
        let slot = Arc::clone(&self.slot);
        let notifier = notifier.clone();
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(runtime.spawn(async move {
            let outcome = load(source.as_ref(), decoder, &reference).await;
            let applied = slot
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .complete(&reference, outcome);
            if applied {
                notifier.notify(ChangeKind::Background);
            }
        }));
    }

    /// The decoded image for the current reference, if it has arrived.
    #[must_use]
    pub fn image(&self) -> Option<Arc<BackgroundImage>> {
        self.lock_slot().image.clone()
    }

    /// Current load status.
    #[must_use]
    pub fn status(&self) -> BackgroundStatus {
        self.lock_slot().status
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, BackgroundSlot> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for BackgroundFetcher {
    fn default() -> Self {
        Self::new(Arc::new(DefaultSource::new()), Arc::new(RasterDecoder))
    }
}

impl Drop for BackgroundFetcher {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
