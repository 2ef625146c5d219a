use crate::descriptor::FileDescriptor;
use crate::error::{AppError, Result};
use crate::scanner::Scanner;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One row of a selection CSV. Column names are kept for compatibility with
/// files written by earlier releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SelectionRow {
    dosya_yolu: String,
    proje_yolu: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub matched: usize,
    /// Listed paths that are not part of the current scan.
    pub missing: Vec<PathBuf>,
}

/// Writes every selected descriptor as `(absolute path, root-relative path)`.
pub fn save_selection_csv(files: &[FileDescriptor], root: &Path, path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut written = 0;
    for file in files.iter().filter(|f| f.is_selected) {
        let relative = pathdiff::diff_paths(&file.path, root).unwrap_or_else(|| file.path.clone());
        writer.serialize(SelectionRow {
            dosya_yolu: file.path.to_string_lossy().into_owned(),
            proje_yolu: relative.to_string_lossy().into_owned(),
        })?;
        written += 1;
    }
    writer.flush().map_err(|e| AppError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::info!("Saved {} selected paths to {}", written, path.display());
    Ok(written)
}

/// Resolves each row to its absolute path when that still exists, otherwise
/// to the relative path under `root`.
pub fn load_selection_csv(path: &Path, root: &Path) -> Result<Vec<PathBuf>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut resolved = Vec::new();
    for row in reader.deserialize::<SelectionRow>() {
        let row = row?;
        let absolute = PathBuf::from(&row.dosya_yolu);
        if !row.dosya_yolu.is_empty() && absolute.exists() {
            resolved.push(absolute);
            continue;
        }
        let relative: PathBuf = row
            .proje_yolu
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .collect();
        if relative.as_os_str().is_empty() {
            log::warn!("Selection row without a usable path: {:?}", row);
            continue;
        }
        resolved.push(root.join(relative));
    }
    log::debug!("Loaded {} paths from {}", resolved.len(), path.display());
    Ok(resolved)
}

pub fn apply_selection(scanner: &mut Scanner, paths: &[PathBuf]) -> SelectionReport {
    let (found, missing): (Vec<&PathBuf>, Vec<&PathBuf>) = paths
        .iter()
        .partition(|p| scanner.get_file_by_path(p).is_some());
    for path in &missing {
        log::warn!("Selected path not found in scan: {}", path.display());
    }
    SelectionReport {
        matched: scanner.set_selected(found, true),
        missing: missing.into_iter().cloned().collect(),
    }
}
