//! Album naming rules and the read-only album directory.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::CatalogStore;

/// Album name for images that sit directly inside a media root.
pub const ROOT_ALBUM: &str = "Root";

/// Where an image lands in the catalog, derived from its path relative to a media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Base name of the deepest enclosing directory, or [`ROOT_ALBUM`].
    pub album: String,
    /// Parent directory relative to the root; empty when the parent is the root.
    pub directory_path: String,
    /// Base name of the file.
    pub filename: String,
}

/// Classify a root-relative image path into album, directory and file name.
///
/// Album boundaries are the deepest enclosing directory, so `2024/Summer/a.jpg`
/// belongs to album `Summer`. Returns `None` for paths without a file name.
pub fn placement_for(relative: &Path) -> Option<Placement> {
    let filename = relative.file_name()?.to_string_lossy().into_owned();
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    let album = parent
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ROOT_ALBUM.to_string());
    Some(Placement {
        album,
        directory_path: parent.to_string_lossy().into_owned(),
        filename,
    })
}

/// Reduce a requested album to its last path segment (`"parent/child"` -> `"child"`).
///
/// Both separators are accepted regardless of platform. Returns `None` when
/// nothing but whitespace and separators remain, which callers treat as "all albums".
#[must_use]
pub fn album_leaf(raw: &str) -> Option<&str> {
    raw.split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .last()
}

/// Read view over the distinct album names in the catalog.
#[derive(Debug, Clone)]
pub struct AlbumDirectory {
    store: Arc<CatalogStore>,
}

impl AlbumDirectory {
    pub fn new(store: Arc<CatalogStore>) -> Self {
        Self { store }
    }

    /// Distinct album names, across every media root.
    pub fn names(&self) -> BTreeSet<String> {
        self.store.list_album_names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(name)
    }
}
