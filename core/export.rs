use crate::descriptor::FileDescriptor;
use crate::error::{AppError, Result};
use crate::extensions::ExtensionRegistry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
pub const SEPARATOR_WIDTH: usize = 80;
pub const READ_ERROR_PREFIX: &str = "File read error: ";
pub const FOLDER_FALLBACK_GROUP: &str = "root";
pub const LAYER_FALLBACK_GROUP: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Immediate parent directory name.
    Folder,
    /// Detected layer name.
    Layer,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Folder => f.write_str("folder"),
            GroupBy::Layer => f.write_str("layer"),
        }
    }
}

/// Writes selected files into one BOM-prefixed text file per group.
#[derive(Debug, Clone)]
pub struct Exporter {
    registry: ExtensionRegistry,
}

impl Exporter {
    pub fn new(registry: ExtensionRegistry) -> Self {
        Self { registry }
    }

    /// Returns the produced file for every non-empty group, in order of first
    /// occurrence. A file that cannot be read becomes an error record; only
    /// failures to write the output abort the export.
    pub fn export_files(
        &self,
        files: &[FileDescriptor],
        output_dir: &Path,
        group_by: Option<GroupBy>,
        custom_name: Option<&str>,
    ) -> Result<IndexMap<String, PathBuf>> {
        fs::create_dir_all(output_dir).map_err(|e| AppError::DirCreation {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let groups = group_files(files, group_by, custom_name);
        log::info!(
            "Exporting {} files in {} groups to {}",
            files.len(),
            groups.len(),
            output_dir.display()
        );

        let mut exported = IndexMap::new();
        for (group_name, group) in groups {
            if group.is_empty() {
                continue;
            }
            let target = output_dir.join(format!("{}.txt", sanitize_group_name(&group_name)));
            self.write_group(&target, &group)?;
            log::debug!(
                "Group '{}' ({} files) written to {}",
                group_name,
                group.len(),
                target.display()
            );
            exported.insert(group_name, target);
        }
        Ok(exported)
    }

    fn write_group(&self, target: &Path, group: &[&FileDescriptor]) -> Result<()> {
        let write_err = |e: std::io::Error| AppError::FileWrite {
            path: target.to_path_buf(),
            source: e,
        };
        let mut out = BufWriter::new(File::create(target).map_err(write_err)?);
        out.write_all(&UTF8_BOM).map_err(write_err)?;

        let reference = group
            .first()
            .and_then(|f| f.path.parent())
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        for file in group {
            let record = match fs::read_to_string(&file.path) {
                Ok(content) => {
                    let content = self.registry.process_content(&file.path, &content);
                    format_record(&display_path(&file.path, &reference), &content)
                }
                Err(e) => {
                    log::warn!("Could not read {} for export: {}", file.path.display(), e);
                    format_record(
                        &file.path.to_string_lossy(),
                        &format!("{}{}", READ_ERROR_PREFIX, e),
                    )
                }
            };
            out.write_all(record.as_bytes()).map_err(write_err)?;
        }
        out.flush().map_err(write_err)
    }
}

fn group_files<'a>(
    files: &'a [FileDescriptor],
    group_by: Option<GroupBy>,
    custom_name: Option<&str>,
) -> IndexMap<String, Vec<&'a FileDescriptor>> {
    let mut groups: IndexMap<String, Vec<&FileDescriptor>> = IndexMap::new();
    match group_by {
        None => {
            let name = custom_name
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!("export_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
                });
            groups.insert(name, files.iter().collect());
        }
        Some(GroupBy::Folder) => {
            for file in files {
                let key = if file.parent_folder.is_empty() {
                    FOLDER_FALLBACK_GROUP.to_string()
                } else {
                    file.parent_folder.clone()
                };
                groups.entry(key).or_default().push(file);
            }
        }
        Some(GroupBy::Layer) => {
            for file in files {
                let key = file
                    .layer_name
                    .clone()
                    .unwrap_or_else(|| LAYER_FALLBACK_GROUP.to_string());
                groups.entry(key).or_default().push(file);
            }
        }
    }
    groups
}

/// Keeps alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_group_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Backslash-joined path starting at the last segment of `reference`.
pub fn display_path(path: &Path, reference: &Path) -> String {
    fn segments(p: &Path) -> Vec<String> {
        p.components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    }
    let skip = segments(reference).len().saturating_sub(1);
    let parts = segments(path);
    let tail = parts.get(skip..).unwrap_or(&[]);
    format!("\\{}", tail.join("\\"))
}

pub fn format_record(display_path: &str, content: &str) -> String {
    let rule = "=".repeat(SEPARATOR_WIDTH);
    format!("Path: {}\nCode:\n{}\n\n{}\n\n", display_path, content, rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exporter() -> Exporter {
        Exporter::new(ExtensionRegistry::with_defaults([".py", ".ts", ".java"]))
    }

    fn write(root: &Path, rel: &str, content: &str) -> FileDescriptor {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        FileDescriptor::stat(path).unwrap()
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_group_name("my group/v1.2"), "my_group_v1_2");
        assert_eq!(sanitize_group_name("kök-dir_ok"), "kök-dir_ok");
    }

    #[test]
    fn display_path_starts_at_grandparent_name() {
        let reference = Path::new("/work/proj");
        assert_eq!(
            display_path(Path::new("/work/proj/src/a.py"), reference),
            "\\proj\\src\\a.py"
        );
        assert_eq!(
            display_path(Path::new("/work/proj/src/deep/b.py"), reference),
            "\\proj\\src\\deep\\b.py"
        );
    }

    #[test]
    fn record_layout() {
        let record = format_record("\\a\\b.py", "x = 1");
        let expected = format!("Path: \\a\\b.py\nCode:\nx = 1\n\n{}\n\n", "=".repeat(80));
        assert_eq!(record, expected);
    }

    #[test]
    fn single_group_keeps_order_and_applies_transforms() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let files = vec![
            write(src.path(), "proj/src/z.py", "print('z')"),
            write(src.path(), "proj/src/Main.java", "package p;\nimport q.R;\nclass Main {}"),
            write(src.path(), "proj/src/a.py", "print('a')"),
        ];

        let result = exporter()
            .export_files(&files, out.path(), None, Some("bundle v1"))
            .unwrap();
        assert_eq!(result.len(), 1);
        let produced = &result["bundle v1"];
        assert_eq!(produced, &out.path().join("bundle_v1.txt"));

        let bytes = fs::read(produced).unwrap();
        assert_eq!(&bytes[..3], &UTF8_BOM);
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(text.matches("Path: ").count(), 3);
        let z = text.find("\\proj\\src\\z.py").unwrap();
        let main = text.find("\\proj\\src\\Main.java").unwrap();
        let a = text.find("\\proj\\src\\a.py").unwrap();
        assert!(z < main && main < a);
        assert!(text.contains("Code:\nclass Main {}\n"));
        assert!(!text.contains("import q.R;"));
    }

    #[test]
    fn default_name_uses_timestamp() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let files = vec![write(src.path(), "a/b.py", "")];
        let result = exporter()
            .export_files(&files, out.path(), None, Some(""))
            .unwrap();
        let name = result.keys().next().unwrap();
        assert!(name.starts_with("export_"));
        assert_eq!(name.len(), "export_20240101_120000".len());
    }

    #[test]
    fn groups_by_layer_with_fallback() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let files = vec![
            write(src.path(), "app/web/index.ts", "1"),
            write(src.path(), "app/service/s.py", "2"),
            write(src.path(), "app/web/other.ts", "3"),
        ];
        let result = exporter()
            .export_files(&files, out.path(), Some(GroupBy::Layer), None)
            .unwrap();
        let keys: Vec<_> = result.keys().cloned().collect();
        assert_eq!(keys, vec!["other", "service"]);
        let other = fs::read_to_string(&result["other"]).unwrap();
        assert_eq!(other.matches("Path: ").count(), 2);
    }

    #[test]
    fn files_without_parent_folder_group_under_root() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let loose = FileDescriptor::from_path("no_such_loose_file.py");
        assert!(loose.parent_folder.is_empty());
        let files = vec![loose, write(src.path(), "lib/b.py", "b = 1")];

        let result = exporter()
            .export_files(&files, out.path(), Some(GroupBy::Folder), None)
            .unwrap();
        let keys: Vec<_> = result.keys().cloned().collect();
        assert_eq!(keys, vec![FOLDER_FALLBACK_GROUP, "lib"]);
        assert_eq!(result["root"], out.path().join("root.txt"));

        let root_text = fs::read_to_string(&result["root"]).unwrap();
        assert!(root_text.contains("Path: \\no_such_loose_file.py\n"));
        assert!(root_text.contains(READ_ERROR_PREFIX));
    }

    #[test]
    fn empty_selection_produces_nothing() {
        let out = TempDir::new().unwrap();
        let result = exporter()
            .export_files(&[], out.path(), Some(GroupBy::Folder), None)
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
