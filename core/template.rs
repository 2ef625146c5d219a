use crate::descriptor::FileDescriptor;
use crate::error::{AppError, Result};
use crate::export::GroupBy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// `null` exports everything into a single group.
    pub group_by: Option<GroupBy>,
    /// Use the template name as the export name when not grouping.
    pub custom_naming: bool,
}

/// Reusable selection criteria plus export options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub description: String,
    pub file_patterns: Vec<String>,
    pub folder_patterns: Vec<String>,
    pub layer_patterns: Vec<String>,
    pub export_settings: ExportSettings,
}

impl Template {
    /// Derives the pattern sets from `selected`. Empty folders and missing
    /// layers are not recorded as patterns.
    pub fn from_selection(
        name: &str,
        description: &str,
        selected: &[FileDescriptor],
        export_settings: ExportSettings,
    ) -> Self {
        let mut template = Self {
            name: name.to_string(),
            description: description.to_string(),
            file_patterns: Vec::new(),
            folder_patterns: Vec::new(),
            layer_patterns: Vec::new(),
            export_settings,
        };
        template.derive_patterns(selected);
        template
    }

    fn derive_patterns(&mut self, selected: &[FileDescriptor]) {
        self.file_patterns = sorted_set(selected.iter().map(|f| &f.extension));
        self.folder_patterns = sorted_set(selected.iter().map(|f| &f.parent_folder));
        self.layer_patterns = sorted_set(selected.iter().filter_map(|f| f.layer_name.as_ref()));
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Conjunction of the three pattern checks; an empty pattern list passes.
    pub fn matches_file(&self, file: &FileDescriptor) -> bool {
        let extension_ok = self.file_patterns.is_empty()
            || self
                .file_patterns
                .iter()
                .any(|p| file.extension.ends_with(p.as_str()));
        if !extension_ok {
            return false;
        }

        let path = file.path.to_string_lossy();
        let folder_ok = self.folder_patterns.is_empty()
            || self
                .folder_patterns
                .iter()
                .any(|p| path.contains(p.as_str()));
        if !folder_ok {
            return false;
        }

        self.layer_patterns.is_empty()
            || file.layer_name.as_ref().is_some_and(|layer| {
                self.layer_patterns
                    .iter()
                    .any(|p| layer.contains(p.as_str()))
            })
    }
}

fn sorted_set<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(AppError::InvalidArgument(format!(
            "'{}' is not a usable template name",
            name
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(AppError::InvalidArgument(format!(
            "Template name '{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}

/// Templates persisted as one `<name>.json` file each, held fully in memory.
#[derive(Debug)]
pub struct TemplateStore {
    dir: PathBuf,
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    /// Loads every `*.json` file in `dir`. Unreadable files are skipped with a warning.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| AppError::DirCreation {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| AppError::FileRead {
                path: dir.to_path_buf(),
                source: e,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        candidates.sort();

        let mut templates = BTreeMap::new();
        for path in candidates {
            match load_template(&path) {
                Ok(template) => {
                    log::debug!("Loaded template '{}' from {}", template.name, path.display());
                    templates.insert(template.name.clone(), template);
                }
                Err(e) => log::warn!("Skipping template file {}: {}", path.display(), e),
            }
        }
        log::info!("{} templates loaded from {}", templates.len(), dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            templates,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Template> {
        self.get(name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }

    pub fn template_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn create(
        &mut self,
        name: &str,
        description: &str,
        selected: &[FileDescriptor],
        export_settings: Option<ExportSettings>,
    ) -> Result<Template> {
        validate_name(name)?;
        if self.templates.contains_key(name) {
            return Err(AppError::DuplicateName(name.to_string()));
        }
        let template = Template::from_selection(
            name,
            description,
            selected,
            export_settings.unwrap_or_default(),
        );
        self.persist(&template)?;
        log::info!("Created template '{}'", name);
        Ok(template)
    }

    /// Only the given parts change; patterns are re-derived when `selected` is given.
    pub fn update(
        &mut self,
        name: &str,
        description: Option<&str>,
        selected: Option<&[FileDescriptor]>,
        export_settings: Option<ExportSettings>,
    ) -> Result<Template> {
        let mut template = self.require(name)?.clone();
        if let Some(description) = description {
            template.description = description.to_string();
        }
        if let Some(selected) = selected {
            template.derive_patterns(selected);
        }
        if let Some(settings) = export_settings {
            template.export_settings = settings;
        }
        self.persist(&template)?;
        log::info!("Updated template '{}'", name);
        Ok(template)
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.require(name)?;
        let path = self.template_path(name);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| AppError::FileWrite {
                path: path.clone(),
                source: e,
            })?;
        }
        self.templates.remove(name);
        log::info!("Deleted template '{}'", name);
        Ok(())
    }

    pub fn export_to(&self, name: &str, path: &Path) -> Result<()> {
        let template = self.require(name)?;
        write_json(path, &template.to_json()?)
    }

    /// A colliding name gets `_1`, `_2`, ... appended until it is unique.
    pub fn import_from(&mut self, path: &Path) -> Result<Template> {
        let mut template = load_template(path)?;
        validate_name(&template.name)?;
        let original = template.name.clone();
        let mut counter = 1;
        while self.templates.contains_key(&template.name) {
            template.name = format!("{}_{}", original, counter);
            counter += 1;
        }
        if template.name != original {
            log::info!("Imported template '{}' renamed to '{}'", original, template.name);
        }
        self.persist(&template)?;
        Ok(template)
    }

    pub fn find_matching_files(
        &self,
        template: &Template,
        files: &[FileDescriptor],
    ) -> Vec<FileDescriptor> {
        files
            .iter()
            .filter(|f| template.matches_file(f))
            .cloned()
            .collect()
    }

    /// Writes through before touching the in-memory map.
    fn persist(&mut self, template: &Template) -> Result<()> {
        write_json(&self.template_path(&template.name), &template.to_json()?)?;
        self.templates
            .insert(template.name.clone(), template.clone());
        Ok(())
    }
}

fn load_template(path: &Path) -> Result<Template> {
    let json = fs::read_to_string(path).map_err(|e| AppError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Template::from_json(&json)
}

fn write_json(path: &Path, json: &str) -> Result<()> {
    fs::write(path, json).map_err(|e| AppError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn selection() -> Vec<FileDescriptor> {
        vec![
            FileDescriptor::from_path("/p/app/service/Billing.java"),
            FileDescriptor::from_path("/p/app/service/Invoice.java"),
            FileDescriptor::from_path("/p/app/web/index.ts"),
        ]
    }

    #[test]
    fn patterns_are_sorted_sets() {
        let t = Template::from_selection("t", "", &selection(), ExportSettings::default());
        assert_eq!(t.file_patterns, vec![".java", ".ts"]);
        assert_eq!(t.folder_patterns, vec!["service", "web"]);
        assert_eq!(t.layer_patterns, vec!["service"]);
    }

    #[test]
    fn json_uses_null_for_ungrouped_exports() {
        let t = Template::from_selection("t", "d", &[], ExportSettings::default());
        let value: serde_json::Value = serde_json::from_str(&t.to_json().unwrap()).unwrap();
        assert_eq!(value["export_settings"]["group_by"], serde_json::Value::Null);
        assert_eq!(value["export_settings"]["custom_naming"], false);

        let grouped: Template = Template::from_json(
            r#"{"name":"g","description":"","file_patterns":[],"folder_patterns":[],
                "layer_patterns":[],"export_settings":{"group_by":"layer","custom_naming":true}}"#,
        )
        .unwrap();
        assert_eq!(grouped.export_settings.group_by, Some(GroupBy::Layer));
    }

    #[test]
    fn matching_rules() {
        let mut t = Template::from_selection("t", "", &[], ExportSettings::default());
        let billing = FileDescriptor::from_path("/p/app/service/Billing.java");
        let plain = FileDescriptor::from_path("/p/app/web/index.ts");

        assert!(t.matches_file(&billing) && t.matches_file(&plain));

        t.file_patterns = vec![".java".into()];
        assert!(t.matches_file(&billing));
        assert!(!t.matches_file(&plain));

        t.file_patterns.clear();
        t.folder_patterns = vec!["app/web".into()];
        assert!(!t.matches_file(&billing));
        assert!(t.matches_file(&plain));

        t.folder_patterns.clear();
        t.layer_patterns = vec!["serv".into()];
        assert!(t.matches_file(&billing));
        assert!(!t.matches_file(&plain), "files without a layer fail layer patterns");
    }

    #[test]
    fn create_update_delete() {
        let dir = TempDir::new().unwrap();
        let mut store = TemplateStore::open(dir.path()).unwrap();
        store.create("X", "first", &selection(), None).unwrap();
        assert!(matches!(
            store.create("X", "again", &[], None),
            Err(AppError::DuplicateName(_))
        ));
        assert_eq!(store.get("X").unwrap().description, "first");

        let updated = store
            .update("X", Some("second"), Some(&selection()[2..]), None)
            .unwrap();
        assert_eq!(updated.file_patterns, vec![".ts"]);
        assert!(store.get("X").unwrap().layer_patterns.is_empty());

        let reopened = TemplateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("X"), Some(&updated));

        assert!(matches!(
            store.update("missing", None, None, None),
            Err(AppError::NotFound(_))
        ));
        store.delete("X").unwrap();
        assert!(store.get("X").is_none());
        assert!(!dir.path().join("X.json").exists());
        assert!(matches!(store.delete("X"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn rejects_names_with_separators() {
        let dir = TempDir::new().unwrap();
        let mut store = TemplateStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.create("a/b", "", &[], None),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.create("  ", "", &[], None),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn corrupt_files_do_not_block_loading() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        {
            let mut store = TemplateStore::open(dir.path()).unwrap();
            store.create("ok", "", &[], None).unwrap();
        }
        let store = TemplateStore::open(dir.path()).unwrap();
        let names: Vec<_> = store.list().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn import_renames_on_collision() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let mut store = TemplateStore::open(dir.path()).unwrap();
        store.create("X", "", &selection(), None).unwrap();

        let exported = outside.path().join("X.json");
        store.export_to("X", &exported).unwrap();
        let first = store.import_from(&exported).unwrap();
        let second = store.import_from(&exported).unwrap();
        assert_eq!(first.name, "X_1");
        assert_eq!(second.name, "X_2");
        assert!(dir.path().join("X_2.json").is_file());
        assert_eq!(first.file_patterns, store.get("X").unwrap().file_patterns);
    }
}
