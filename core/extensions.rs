use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Extension whose sources get import/package boilerplate stripped before export.
pub const STRIP_IMPORTS_EXTENSION: &str = ".java";

/// A pure text rewrite applied to a file's content before it is exported.
#[derive(Clone)]
pub enum ContentTransform {
    /// Drops every line whose trimmed form starts with `import ` or `package `.
    StripImportLines,
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl ContentTransform {
    pub fn apply(&self, content: &str) -> String {
        match self {
            ContentTransform::StripImportLines => strip_import_lines(content),
            ContentTransform::Custom(f) => f(content),
        }
    }
}

impl fmt::Debug for ContentTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentTransform::StripImportLines => f.write_str("StripImportLines"),
            ContentTransform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn strip_import_lines(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("import ") || trimmed.starts_with("package "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lower-cases an extension and makes sure it carries a leading dot.
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

/// Dot-prefixed, lower-cased extension of `path`, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Maps supported extensions to an optional content transform.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    transforms: BTreeMap<String, Option<ContentTransform>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every given extension with the identity transform. Java
    /// sources get the built-in import stripping when they are in the set.
    pub fn with_defaults<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for ext in supported {
            registry.register(ext.as_ref(), None);
        }
        if registry.is_supported(STRIP_IMPORTS_EXTENSION) {
            registry.register(
                STRIP_IMPORTS_EXTENSION,
                Some(ContentTransform::StripImportLines),
            );
        }
        registry
    }

    pub fn register(&mut self, extension: &str, transform: Option<ContentTransform>) {
        let key = normalize_extension(extension);
        log::trace!("Registering extension {} (transform: {:?})", key, transform);
        self.transforms.insert(key, transform);
    }

    pub fn is_supported(&self, extension: &str) -> bool {
        self.transforms.contains_key(&normalize_extension(extension))
    }

    pub fn is_supported_path(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        !ext.is_empty() && self.transforms.contains_key(&ext)
    }

    pub fn supported_extensions(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    pub fn process_content(&self, path: &Path, content: &str) -> String {
        match self.transforms.get(&extension_of(path)) {
            Some(Some(transform)) => transform.apply(content),
            _ => content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn keys_are_normalized() {
        let mut registry = ExtensionRegistry::new();
        registry.register("PY", None);
        assert!(registry.is_supported(".py"));
        assert!(registry.is_supported("Py"));
        assert!(!registry.is_supported(".rs"));
    }

    #[test]
    fn defaults_seed_java_transform() {
        let registry = ExtensionRegistry::with_defaults([".py", ".JAVA"]);
        let exts: Vec<_> = registry.supported_extensions().collect();
        assert_eq!(exts, vec![".java", ".py"]);

        let java = "package a.b;\nimport x.Y;\n  import static z;\nclass A {}\n";
        let processed = registry.process_content(&PathBuf::from("A.JAVA"), java);
        assert_eq!(processed, "class A {}");
    }

    #[test]
    fn java_stays_unsupported_unless_configured() {
        let registry = ExtensionRegistry::with_defaults([".py"]);
        let exts: Vec<_> = registry.supported_extensions().collect();
        assert_eq!(exts, vec![".py"]);
        assert!(!registry.is_supported_path(&PathBuf::from("src/Main.java")));
        let java = "import x.Y;\nclass A {}";
        assert_eq!(
            registry.process_content(&PathBuf::from("Main.java"), java),
            java
        );
    }

    #[test]
    fn identity_for_unregistered_transform() {
        let registry = ExtensionRegistry::with_defaults([".py"]);
        let src = "import os\nprint(1)\n";
        assert_eq!(registry.process_content(&PathBuf::from("a.py"), src), src);
        assert_eq!(registry.process_content(&PathBuf::from("a.txt"), src), src);
    }

    #[test]
    fn custom_transform_is_applied() {
        let mut registry = ExtensionRegistry::new();
        registry.register(
            ".ts",
            Some(ContentTransform::Custom(Arc::new(|c: &str| c.to_uppercase()))),
        );
        assert_eq!(
            registry.process_content(&PathBuf::from("x.ts"), "abc"),
            "ABC"
        );
    }

    #[test]
    fn path_without_extension_is_not_supported() {
        let registry = ExtensionRegistry::with_defaults([".py", ".java"]);
        assert!(!registry.is_supported_path(&PathBuf::from("Makefile")));
        assert!(registry.is_supported_path(&PathBuf::from("src/Main.Java")));
    }
}
