/**
 * File format classification and write-strategy table
 */

use std::path::Path;

/// Recognized image container families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Tiff,
}

/// How a target timestamp is persisted for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Rewrite the embedded capture-time fields (and the filesystem mtime).
    Embedded,
    /// Set filesystem access/modification times only.
    FilesystemOnly,
}

/// Extension (lowercase, no dot) to kind. Adding a format means adding a row.
pub const SUPPORTED_EXTENSIONS: [(&str, ImageKind); 5] = [
    ("jpg", ImageKind::Jpeg),
    ("jpeg", ImageKind::Jpeg),
    ("png", ImageKind::Png),
    ("tif", ImageKind::Tiff),
    ("tiff", ImageKind::Tiff),
];

impl ImageKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path)?;
        SUPPORTED_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|&(_, kind)| kind)
    }
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

/// Pick the strategy for `kind` given the kinds the embedded backend can rewrite.
/// Every recognized kind can at least take filesystem times.
pub fn strategy_for(kind: ImageKind, embedded_kinds: &[ImageKind]) -> Strategy {
    if embedded_kinds.contains(&kind) {
        Strategy::Embedded
    } else {
        Strategy::FilesystemOnly
    }
}
