use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use serde::Deserialize;

/// Runtime configuration for the catalog and rotation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Directories scanned recursively for images. Each one is a separate album namespace.
    pub media_roots: Vec<PathBuf>,
    /// File extensions to catalog, with or without the leading dot. Case-insensitive.
    pub allowed_extensions: Vec<String>,
    /// Location of the SQLite catalog.
    pub db_path: PathBuf,
    /// Optional deterministic seed for image selection.
    pub shuffle_seed: Option<u64>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.media_roots.is_empty(),
            "media-roots must list at least one directory"
        );
        self.allowed_extensions = normalize_extensions(&self.allowed_extensions);
        ensure!(
            !self.allowed_extensions.is_empty(),
            "allowed-extensions must contain at least one extension"
        );
        Ok(self)
    }

    /// Lower-cased extensions without the leading dot, as the scanner matches them.
    pub fn extensions(&self) -> Vec<String> {
        normalize_extensions(&self.allowed_extensions)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            media_roots: vec![PathBuf::from("/config/media")],
            allowed_extensions: [".jpg", ".jpeg", ".png", ".gif", ".webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            db_path: PathBuf::from("/config/picture_frame.db"),
            shuffle_seed: None,
        }
    }
}

/// Strip leading dots, lower-case, drop empties and duplicates.
pub fn normalize_extensions(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for ext in raw {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}
