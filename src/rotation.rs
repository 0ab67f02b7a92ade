//! No-repeat image rotation over the catalog.
//!
//! Rules:
//! - Draw uniformly at random from the images in scope that carry no displayed-mark.
//! - Mark every image handed out.
//! - When every image in scope is marked, clear all marks and start a new cycle.
//! - Marks are global, so narrowing or widening the album filter changes which
//!   images count as already shown.

use std::path::PathBuf;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::albums::{AlbumDirectory, album_leaf};
use crate::catalog::{CatalogStore, ImageRecord};

/// The image handed to the display client. All fields empty means "nothing to show".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub album: String,
    pub source_root: PathBuf,
}

impl ImageResult {
    /// Sentinel for an empty catalog or an album with no images.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

impl From<ImageRecord> for ImageResult {
    fn from(record: ImageRecord) -> Self {
        Self {
            path: record.absolute_path(),
            relative_path: record.relative_path,
            album: record.album_name,
            source_root: record.source_root,
        }
    }
}

/// Explicit album choice for a single request, distinct from "no preference".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumFilter {
    /// Rotate through every album.
    All,
    /// Restrict to albums with this name.
    Named(String),
}

impl AlbumFilter {
    /// Interpret a raw request value. Empty input clears the filter;
    /// `"parent/child"` narrows to album `child`.
    pub fn parse(raw: &str) -> Self {
        match album_leaf(raw) {
            Some(name) => Self::Named(name.to_string()),
            None => Self::All,
        }
    }

    fn into_name(self) -> Option<String> {
        match self {
            Self::All => None,
            Self::Named(name) => Some(name),
        }
    }
}

/// Session state plus the selection policy. One instance per process.
#[derive(Debug)]
pub struct RotationEngine {
    store: Arc<CatalogStore>,
    albums: AlbumDirectory,
    current_album: Option<String>,
    current_image: Option<ImageResult>,
    rng: StdRng,
}

impl RotationEngine {
    /// `seed` makes selection reproducible; `None` seeds from the OS.
    pub fn new(store: Arc<CatalogStore>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            albums: AlbumDirectory::new(Arc::clone(&store)),
            store,
            current_album: None,
            current_image: None,
            rng,
        }
    }

    /// Hand out the next image and mark it displayed.
    ///
    /// `Some(filter)` replaces the sticky album (including clearing it);
    /// `None` keeps whatever [`set_album`](Self::set_album) chose.
    pub fn next_image(&mut self, album_override: Option<AlbumFilter>) -> ImageResult {
        if let Some(filter) = album_override {
            self.current_album = filter.into_name();
        }
        let album = self.current_album.clone();
        let album = album.as_deref();

        if self.store.count_undisplayed_images(album) == 0 {
            info!(album = album.unwrap_or("*"), "every image in scope shown; resetting history");
            self.store.clear_displayed_marks();
        }

        if self.store.count_all_images(album) == 0 {
            debug!(album = album.unwrap_or("*"), "no images in scope");
            let empty = ImageResult::empty();
            self.current_image = Some(empty.clone());
            return empty;
        }

        let selected = self
            .store
            .sample_random_undisplayed_image(album, &mut self.rng)
            .or_else(|| {
                debug!("undisplayed pool emptied concurrently; sampling full pool");
                self.store.sample_random_image(album, &mut self.rng)
            });
        let Some(record) = selected else {
            let empty = ImageResult::empty();
            self.current_image = Some(empty.clone());
            return empty;
        };

        if !self.store.mark_displayed(record.id) {
            warn!(image_id = record.id, "could not record displayed image");
        }
        let result = ImageResult::from(record);
        debug!(path = %result.path.display(), album = %result.album, "selected image");
        self.current_image = Some(result.clone());
        result
    }

    /// Pin the rotation to one album, or clear the pin with `None`/empty.
    ///
    /// Unknown albums are rejected and leave the current pin untouched.
    pub fn set_album(&mut self, name: Option<&str>) -> bool {
        let Some(name) = name.and_then(album_leaf) else {
            self.current_album = None;
            info!("album filter cleared");
            return true;
        };
        if !self.albums.contains(name) {
            warn!(album = name, "album not found");
            return false;
        }
        self.current_album = Some(name.to_string());
        info!(album = name, "album filter set");
        true
    }

    pub fn current_album(&self) -> Option<&str> {
        self.current_album.as_deref()
    }

    /// Last result of [`next_image`](Self::next_image), or the empty sentinel.
    pub fn current_image(&self) -> ImageResult {
        self.current_image.clone().unwrap_or_default()
    }

    /// Album names, sorted.
    pub fn available_albums(&self) -> Vec<String> {
        self.albums.names().into_iter().collect()
    }
}
