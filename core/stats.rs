use crate::descriptor::FileDescriptor;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub total_files: usize,
    pub selected_files: usize,
    pub total_bytes: u64,
    pub selected_bytes: u64,
    /// File count per extension over all scanned files.
    pub by_extension: BTreeMap<String, usize>,
}

impl SelectionStats {
    pub fn compute(files: &[FileDescriptor]) -> Self {
        files.iter().fold(Self::default(), |mut stats, file| {
            stats.total_files += 1;
            stats.total_bytes += file.size;
            if file.is_selected {
                stats.selected_files += 1;
                stats.selected_bytes += file.size;
            }
            *stats
                .by_extension
                .entry(file.extension.to_lowercase())
                .or_default() += 1;
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64, selected: bool) -> FileDescriptor {
        let mut d = FileDescriptor::from_path(path);
        d.size = size;
        d.is_selected = selected;
        d
    }

    #[test]
    fn totals_and_extension_counts() {
        let stats = SelectionStats::compute(&[
            file("/p/a.py", 10, true),
            file("/p/b.py", 5, false),
            file("/p/C.TS", 7, true),
        ]);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.selected_files, 2);
        assert_eq!(stats.total_bytes, 22);
        assert_eq!(stats.selected_bytes, 17);
        let exts: Vec<_> = stats.by_extension.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(exts, vec![(".py", 2), (".ts", 1)]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(SelectionStats::compute(&[]), SelectionStats::default());
    }
}
