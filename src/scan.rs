//! Directory scanning: discover images under the media roots and catalog them by album.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::albums::placement_for;
use crate::catalog::CatalogStore;
use crate::error::Error;

/// Outcome of one scan. The catalog itself is the durable result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Album name to the root-relative paths found in it during this scan.
    /// Same-named albums under different roots share one entry.
    pub albums: BTreeMap<String, Vec<PathBuf>>,
    /// Roots that were missing or not directories.
    pub skipped_roots: Vec<PathBuf>,
    /// Images dropped because the catalog rejected their album or image row.
    pub skipped: usize,
}

impl ScanReport {
    /// Album name to number of images found.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.albums
            .iter()
            .map(|(name, images)| (name.clone(), images.len()))
            .collect()
    }

    pub fn total_images(&self) -> usize {
        self.albums.values().map(Vec::len).sum()
    }

    pub fn total_albums(&self) -> usize {
        self.albums.len()
    }
}

/// Return `true` if `path` has one of `exts` (lowercase, without dot).
#[must_use]
pub fn is_supported_image(path: &Path, exts: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| *e == ext)
        })
}

/// Walks media roots and upserts what it finds into the catalog.
#[derive(Debug, Clone)]
pub struct Scanner {
    roots: Vec<PathBuf>,
    exts: Vec<String>,
}

impl Scanner {
    /// `exts` are matched case-insensitively; a leading dot is optional.
    pub fn new(roots: Vec<PathBuf>, exts: &[String]) -> Self {
        Self {
            roots,
            exts: crate::config::normalize_extensions(exts),
        }
    }

    /// Recursively catalog every supported file under every root.
    ///
    /// Missing roots are logged and skipped. Rows for files that disappeared
    /// since an earlier scan are left in place.
    ///
    /// # Errors
    /// Returns [`Error::NoMediaRoots`] only if none of the roots exists.
    pub fn scan(&self, store: &CatalogStore) -> Result<ScanReport, Error> {
        let mut report = ScanReport::default();

        for root in &self.roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "media root does not exist; skipping");
                report.skipped_roots.push(root.clone());
                continue;
            }
            self.scan_root(root, store, &mut report);
        }

        if !self.roots.is_empty() && report.skipped_roots.len() == self.roots.len() {
            let joined = report
                .skipped_roots
                .iter()
                .map(|p| p.to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::NoMediaRoots(joined));
        }

        info!(
            images = report.total_images(),
            albums = report.total_albums(),
            skipped = report.skipped,
            "scan complete"
        );
        Ok(report)
    }

    fn scan_root(&self, root: &Path, store: &CatalogStore, report: &mut ScanReport) {
        let source_root = root.to_string_lossy();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_supported_image(path, &self.exts) {
                continue;
            }
            let Some(placement) = path.strip_prefix(root).ok().and_then(placement_for) else {
                continue;
            };

            let Some(album_id) =
                store.upsert_album(&placement.album, &placement.directory_path, &source_root)
            else {
                warn!(path = %path.display(), album = %placement.album, "album not cataloged; skipping image");
                report.skipped += 1;
                continue;
            };
            if store.upsert_image(&placement.filename, album_id).is_none() {
                report.skipped += 1;
                continue;
            }

            let relative = Path::new(&placement.directory_path).join(&placement.filename);
            report
                .albums
                .entry(placement.album)
                .or_default()
                .push(relative);
        }
    }
}
