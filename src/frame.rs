//! One owned value wiring store, scanner and rotation together.
//!
//! This is the surface a service or timer integration calls into. Every
//! method blocks on filesystem or SQLite I/O; async callers should dispatch
//! through `spawn_blocking` or an equivalent worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::catalog::CatalogStore;
use crate::config::Configuration;
use crate::error::Error;
use crate::rotation::{AlbumFilter, ImageResult, RotationEngine};
use crate::scan::{ScanReport, Scanner};

/// Catalog status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStatus {
    pub total_images: u64,
    pub undisplayed_images: u64,
    pub albums: usize,
    pub current_album: Option<String>,
    pub schema_version: u32,
    pub last_displayed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug)]
pub struct PictureFrame {
    store: Arc<CatalogStore>,
    scanner: Scanner,
    rotation: RotationEngine,
}

impl PictureFrame {
    /// Open the catalog named by `cfg` and prepare the scanner and rotation.
    ///
    /// # Errors
    /// Returns [`Error::NoMediaRoots`] if none of the configured roots exists,
    /// or a storage error if the catalog file cannot be opened.
    pub fn open(cfg: &Configuration) -> Result<Self, Error> {
        if !cfg.media_roots.iter().any(|root| root.is_dir()) {
            let joined = cfg
                .media_roots
                .iter()
                .map(|p| p.to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::NoMediaRoots(joined));
        }
        let legacy_root = cfg.media_roots.first().map(|p| p.as_path());
        let store = Arc::new(CatalogStore::open(&cfg.db_path, legacy_root)?);
        Ok(Self::with_store(store, cfg))
    }

    /// Build around an existing store, e.g. an in-memory catalog.
    pub fn with_store(store: Arc<CatalogStore>, cfg: &Configuration) -> Self {
        Self {
            scanner: Scanner::new(cfg.media_roots.clone(), &cfg.extensions()),
            rotation: RotationEngine::new(Arc::clone(&store), cfg.shuffle_seed),
            store,
        }
    }

    /// Catalog every image under the media roots and report album sizes.
    ///
    /// # Errors
    /// Returns [`Error::NoMediaRoots`] if no configured root exists anymore.
    pub fn scan_media(&self) -> Result<BTreeMap<String, usize>, Error> {
        self.scan_report().map(|report| report.counts())
    }

    /// Like [`scan_media`](Self::scan_media) but keeps the per-image detail.
    ///
    /// # Errors
    /// Returns [`Error::NoMediaRoots`] if no configured root exists anymore.
    pub fn scan_report(&self) -> Result<ScanReport, Error> {
        self.scanner.scan(&self.store)
    }

    pub fn next_image(&mut self, album: Option<AlbumFilter>) -> ImageResult {
        self.rotation.next_image(album)
    }

    pub fn set_album(&mut self, name: Option<&str>) -> bool {
        self.rotation.set_album(name)
    }

    pub fn current_album(&self) -> Option<&str> {
        self.rotation.current_album()
    }

    pub fn current_image(&self) -> ImageResult {
        self.rotation.current_image()
    }

    pub fn available_albums(&self) -> Vec<String> {
        self.rotation.available_albums()
    }

    /// Forget which images were shown.
    pub fn clear_history(&self) -> bool {
        info!("history reset requested");
        self.store.clear_displayed_marks()
    }

    pub fn status(&self) -> FrameStatus {
        FrameStatus {
            total_images: self.store.count_all_images(None),
            undisplayed_images: self.store.count_undisplayed_images(None),
            albums: self.store.list_album_names().len(),
            current_album: self.current_album().map(str::to_string),
            schema_version: self.store.schema_version(),
            last_displayed_at: self.store.last_displayed_at(),
        }
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }
}
