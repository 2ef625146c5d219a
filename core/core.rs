pub mod config;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod extensions;
pub mod git;
pub mod scanner;
pub mod selection;
pub mod stats;
pub mod template;
pub mod tree;

pub use config::{AppDirs, Config, ConfigStore, GitSettings, WindowSettings};
pub use descriptor::{FileDescriptor, LAYER_KEYWORDS, detect_layer_name};
pub use error::{AppError, Result};
pub use export::{Exporter, GroupBy};
pub use extensions::{ContentTransform, ExtensionRegistry};
pub use git::{GitChanges, GitFileStatus, GitStatusProvider, parse_porcelain, status_of};
pub use scanner::{CancelHandle, ProgressCallback, ScanOptions, Scanner};
pub use selection::{SelectionReport, apply_selection, load_selection_csv, save_selection_csv};
pub use stats::SelectionStats;
pub use template::{ExportSettings, Template, TemplateStore};
pub use tree::{FolderTree, NestedNode};
