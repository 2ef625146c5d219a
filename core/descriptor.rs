use crate::error::{AppError, Result};
use crate::extensions::extension_of;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Path-segment keywords that mark an architectural layer.
pub const LAYER_KEYWORDS: [&str; 12] = [
    "controller",
    "service",
    "repository",
    "model",
    "entity",
    "dao",
    "dto",
    "util",
    "helper",
    "domain",
    "infrastructure",
    "application",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub parent_folder: String,
    pub layer_name: Option<String>,
    pub size: u64,
    pub is_selected: bool,
}

impl FileDescriptor {
    /// Builds a descriptor from a path without touching the file system.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent_folder = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            extension: extension_of(&path),
            layer_name: detect_layer_name(&path),
            name,
            parent_folder,
            size: 0,
            is_selected: false,
            path,
        }
    }

    /// Like [`FileDescriptor::from_path`] but fills `size` from file metadata.
    pub fn stat(path: impl Into<PathBuf>) -> Result<Self> {
        let mut descriptor = Self::from_path(path);
        let metadata = fs::metadata(&descriptor.path).map_err(|e| AppError::FileRead {
            path: descriptor.path.clone(),
            source: e,
        })?;
        descriptor.size = metadata.len();
        Ok(descriptor)
    }

    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term)
            || self.path.to_string_lossy().to_lowercase().contains(&term)
            || self
                .layer_name
                .as_ref()
                .is_some_and(|layer| layer.to_lowercase().contains(&term))
    }
}

/// First path segment containing a layer keyword (case-insensitive), as written.
pub fn detect_layer_name(path: &Path) -> Option<String> {
    path.components().find_map(|component| match component {
        Component::Normal(segment) => {
            let segment = segment.to_string_lossy();
            let lower = segment.to_lowercase();
            LAYER_KEYWORDS
                .iter()
                .any(|keyword| lower.contains(keyword))
                .then(|| segment.into_owned())
        }
        _ => None,
    })
}
