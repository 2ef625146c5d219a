use crate::error::{AppError, Result};
use crate::extensions::normalize_extension;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "codepack";
pub const CONFIG_FILENAME: &str = "config.json";
pub const CONFIG_DIR_ENV: &str = "CODEPACK_CONFIG_DIR";
pub const MAX_RECENT_ENTRIES: usize = 10;

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_EXCLUDED_DIRECTORIES: [&str; 6] =
    [".git", "node_modules", "bin", "obj", "build", "dist"];
pub const DEFAULT_SUPPORTED_EXTENSIONS: [&str; 7] =
    [".java", ".cs", ".js", ".jsx", ".ts", ".tsx", ".py"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub last_directory: Option<PathBuf>,
    pub export_directory: Option<PathBuf>,
    pub max_workers: usize,
    pub batch_size: usize,
    pub excluded_directories: Vec<String>,
    pub supported_extensions: Vec<String>,
    pub default_encoding: String,
    pub dark_mode: bool,
    pub window_settings: WindowSettings,
    pub recent_directories: Vec<PathBuf>,
    pub recent_templates: Vec<String>,
    pub git: GitSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splitter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GitSettings {
    pub enabled: bool,
    pub auto_scan: bool,
    /// Seconds a cached repository status stays valid.
    pub cache_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_directory: None,
            export_directory: None,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            excluded_directories: DEFAULT_EXCLUDED_DIRECTORIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            supported_extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_encoding: "utf-8".to_string(),
            dark_mode: false,
            window_settings: WindowSettings::default(),
            recent_directories: Vec::new(),
            recent_templates: Vec::new(),
            git: GitSettings::default(),
        }
    }
}
impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            x: 100,
            y: 100,
            geometry: None,
            state: None,
            splitter: None,
        }
    }
}
impl Default for GitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_scan: true,
            cache_timeout: 300,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(json)?;
        config.validate();
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Repairs values that would make scanning impossible and normalises lists.
    pub fn validate(&mut self) {
        if self.max_workers == 0 {
            log::warn!(
                "max_workers must be at least 1, falling back to {}",
                DEFAULT_MAX_WORKERS
            );
            self.max_workers = DEFAULT_MAX_WORKERS;
        }
        if self.batch_size == 0 {
            log::warn!(
                "batch_size must be at least 1, falling back to {}",
                DEFAULT_BATCH_SIZE
            );
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        self.supported_extensions = dedup(
            self.supported_extensions
                .iter()
                .filter(|e| !e.trim().is_empty())
                .map(|e| normalize_extension(e)),
        );
        self.excluded_directories = dedup(
            self.excluded_directories
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        );
    }

    /// Typed setter for a single key given as text, as used by `config set`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "last_directory" => self.last_directory = non_empty_path(value),
            "export_directory" => self.export_directory = non_empty_path(value),
            "max_workers" => self.max_workers = parse_positive(key, value)?,
            "batch_size" => self.batch_size = parse_positive(key, value)?,
            "excluded_directories" => self.excluded_directories = split_list(value),
            "supported_extensions" => self.supported_extensions = split_list(value),
            "default_encoding" => self.default_encoding = value.trim().to_string(),
            "dark_mode" => self.dark_mode = parse_bool(key, value)?,
            "git.enabled" => self.git.enabled = parse_bool(key, value)?,
            "git.auto_scan" => self.git.auto_scan = parse_bool(key, value)?,
            "git.cache_timeout" => {
                self.git.cache_timeout = value.trim().parse().map_err(|_| {
                    AppError::InvalidArgument(format!("'{}' expects seconds, got '{}'", key, value))
                })?
            }
            _ => {
                return Err(AppError::InvalidArgument(format!(
                    "Unknown or read-only configuration key '{}'",
                    key
                )));
            }
        }
        self.validate();
        Ok(())
    }

    pub fn add_recent_directory(&mut self, directory: &Path) {
        push_recent(&mut self.recent_directories, directory.to_path_buf());
        self.last_directory = Some(directory.to_path_buf());
    }

    pub fn add_recent_template(&mut self, name: &str) {
        push_recent(&mut self.recent_templates, name.to_string());
    }

    pub fn determine_project_root(cli_project_root: Option<&PathBuf>) -> Result<PathBuf> {
        let path_str_opt = cli_project_root
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env::var("PROJECT_ROOT").ok().filter(|s| !s.is_empty()));

        let path_to_resolve = match path_str_opt {
            Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
            None => env::current_dir().map_err(AppError::Io)?,
        };

        if !path_to_resolve.is_dir() {
            return Err(AppError::InvalidRoot(path_to_resolve));
        }
        path_to_resolve.canonicalize().map_err(|e| {
            AppError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to canonicalize project root '{}': {}",
                    path_to_resolve.display(),
                    e
                ),
            ))
        })
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn push_recent<T: PartialEq>(list: &mut Vec<T>, item: T) {
    list.retain(|existing| *existing != item);
    list.insert(0, item);
    list.truncate(MAX_RECENT_ENTRIES);
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(shellexpand::tilde(trimmed).as_ref()))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::InvalidArgument(format!(
            "'{}' expects a positive integer, got '{}'",
            key, value
        ))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(AppError::InvalidArgument(format!(
            "'{}' expects true/false, got '{}'",
            key, value
        ))),
    }
}

/// Locations the application keeps its state in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    pub config: PathBuf,
    pub templates: PathBuf,
    pub exports: PathBuf,
    pub logs: PathBuf,
}

impl AppDirs {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config: config_dir.to_path_buf(),
            templates: config_dir.join("templates"),
            exports: config_dir.join("exports"),
            logs: config_dir.join("logs"),
        }
    }

    /// `--config-dir`, then `CODEPACK_CONFIG_DIR`, then the platform config dir.
    pub fn resolve_config_dir(cli_config_dir: Option<&PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = cli_config_dir {
            return Ok(PathBuf::from(
                shellexpand::tilde(&dir.to_string_lossy()).as_ref(),
            ));
        }
        if let Some(dir) = env::var(CONFIG_DIR_ENV).ok().filter(|s| !s.is_empty()) {
            return Ok(PathBuf::from(shellexpand::tilde(&dir).as_ref()));
        }
        dirs::config_dir()
            .map(|base| base.join(APP_DIR_NAME))
            .ok_or_else(|| {
                AppError::Config("Could not determine the user configuration directory".into())
            })
    }

    fn ensure(&self) -> Result<()> {
        for dir in [&self.config, &self.templates, &self.exports, &self.logs] {
            fs::create_dir_all(dir).map_err(|e| AppError::DirCreation {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Whole-document JSON persistence of [`Config`].
#[derive(Debug)]
pub struct ConfigStore {
    dirs: AppDirs,
    config: Config,
}

impl ConfigStore {
    pub fn open(config_dir: &Path) -> Result<Self> {
        let dirs = AppDirs::new(config_dir);
        dirs.ensure()?;
        let config = Self::load(&dirs.config.join(CONFIG_FILENAME));
        Ok(Self { dirs, config })
    }

    /// Missing or unreadable files yield the defaults; the error is only logged.
    fn load(path: &Path) -> Config {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Config::default();
        }
        log::info!("Loading configuration from: {}", path.display());
        let loaded = fs::read_to_string(path)
            .map_err(|e| AppError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })
            .and_then(|json| Config::from_json(&json));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable config file '{}': {}",
                    path.display(),
                    e
                );
                Config::default()
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dirs(&self) -> &AppDirs {
        &self.dirs
    }

    pub fn path(&self) -> PathBuf {
        self.dirs.config.join(CONFIG_FILENAME)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.path();
        let json = self.config.to_json()?;
        fs::write(&path, json).map_err(|e| AppError::FileWrite { path, source: e })
    }

    /// Applies `f` to the configuration and writes the document back.
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        f(&mut self.config);
        self.config.validate();
        self.save()
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.set_value(key, value)?;
        self.config = candidate;
        self.save()
    }

    pub fn reset(&mut self) -> Result<()> {
        self.config = Config::default();
        self.save()
    }
}
