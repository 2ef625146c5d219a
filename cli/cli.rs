mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use std::path::{Path, PathBuf};
use std::process;

use cli_args::{Cli, Commands, GlobalOpts, ScanOpts, SelectionOpts};
use codepack_core::{
    AppDirs, AppError, Config, ConfigStore, GroupBy, ScanOptions, Scanner, Template,
    TemplateStore, apply_selection, load_selection_csv,
};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;

    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(cli_args, quiet) {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = match e.downcast_ref::<AppError>() {
                Some(AppError::Config(_)) => 1,
                Some(AppError::InvalidArgument(_)) => 1,
                Some(AppError::ScanCancelled) => 1,
                Some(AppError::InvalidRoot(_)) => 2,
                Some(AppError::Io(_)) => 2,
                Some(AppError::FileRead { .. }) => 2,
                Some(AppError::FileWrite { .. }) => 2,
                Some(AppError::DirCreation { .. }) => 2,
                Some(AppError::WalkDir(_)) => 2,
                Some(AppError::Glob(_)) => 2,
                Some(AppError::DuplicateName(_)) => 3,
                Some(AppError::NotFound(_)) => 3,
                Some(AppError::Git(_)) => 4,
                Some(AppError::JsonSerialize(_)) => 6,
                Some(AppError::Csv(_)) => 6,
                Some(_) => 1,
                None => 1,
            };
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    if let Commands::Completion(args) = &command {
        log::debug!("Executing 'completion' command...");
        return commands::completion::handle_completion_command(args, quiet);
    }

    let mut session = Session::open(&cli.global)?;
    match command {
        Commands::Scan(args) => {
            log::debug!("Executing 'scan' command...");
            commands::scan::handle_scan_command(&args, &mut session, quiet)
        }
        Commands::Export(args) => {
            log::debug!("Executing 'export' command...");
            commands::export::handle_export_command(&args, &mut session, quiet)
        }
        Commands::Tree(args) => {
            log::debug!("Executing 'tree' command...");
            commands::tree::handle_tree_command(&args, &mut session, quiet)
        }
        Commands::Stats(args) => {
            log::debug!("Executing 'stats' command...");
            commands::stats::handle_stats_command(&args, &mut session, quiet)
        }
        Commands::Template(args) => {
            log::debug!("Executing 'template' command...");
            commands::template::handle_template_command(args.action, &mut session, quiet)
        }
        Commands::Selection(args) => {
            log::debug!("Executing 'selection' command...");
            commands::selection::handle_selection_command(args.action, &mut session, quiet)
        }
        Commands::Config(args) => {
            log::debug!("Executing 'config' command...");
            commands::config::handle_config_command(args.action, &mut session, quiet)
        }
        Commands::Completion(_) => Ok(()),
    }
}

/// Configuration and application directories shared by every command.
pub struct Session {
    store: Option<ConfigStore>,
    pub config: Config,
    pub dirs: AppDirs,
}

impl Session {
    fn open(global: &GlobalOpts) -> Result<Self> {
        let config_dir = AppDirs::resolve_config_dir(global.config_dir.as_ref())
            .context("Failed to determine configuration directory")?;
        if global.no_config {
            log::debug!("Stored configuration disabled, using defaults");
            return Ok(Self {
                store: None,
                config: Config::default(),
                dirs: AppDirs::new(&config_dir),
            });
        }
        let store = ConfigStore::open(&config_dir).with_context(|| {
            format!(
                "Failed to open configuration in {}",
                config_dir.display()
            )
        })?;
        Ok(Self {
            config: store.config().clone(),
            dirs: store.dirs().clone(),
            store: Some(store),
        })
    }

    pub fn store_mut(&mut self) -> Result<&mut ConfigStore> {
        self.store.as_mut().ok_or_else(|| {
            anyhow::Error::from(AppError::InvalidArgument(
                "the stored configuration is disabled by --no-config".into(),
            ))
        })
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.store.as_ref().map(ConfigStore::path)
    }

    /// Applies `f` and persists the result unless `--no-config` is active.
    pub fn update_config<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        match self.store.as_mut() {
            Some(store) => {
                store.update(f).context("Failed to save configuration")?;
                self.config = store.config().clone();
            }
            None => f(&mut self.config),
        }
        Ok(())
    }

    pub fn templates(&self) -> Result<TemplateStore> {
        TemplateStore::open(&self.dirs.templates).with_context(|| {
            format!(
                "Failed to load templates from {}",
                self.dirs.templates.display()
            )
        })
    }
}

/// Stored configuration with the command line scan overrides applied.
fn effective_config(base: &Config, opts: &ScanOpts) -> Config {
    let mut config = base.clone();
    if let Some(workers) = opts.workers {
        config.max_workers = workers;
    }
    if let Some(batch_size) = opts.batch_size {
        config.batch_size = batch_size;
    }
    config
        .excluded_directories
        .extend(opts.exclude_dirs.iter().cloned());
    if !opts.extensions.is_empty() {
        config.supported_extensions = opts.extensions.clone();
    }
    config.validate();
    log::trace!("Effective scan config: {:?}", config);
    config
}

pub fn scan_project(session: &Session, opts: &ScanOpts) -> Result<(PathBuf, Scanner)> {
    let root = Config::determine_project_root(opts.root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", root.display());

    let config = effective_config(&session.config, opts);
    let mut scanner = Scanner::new(ScanOptions::from_config(&config));
    let progress = |percent: f64| log::debug!("Scan progress: {:.0}%", percent);
    scanner
        .scan(&root, Some(&progress))
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    Ok((root, scanner))
}

/// Marks files according to the selection options. Without any option every
/// file is selected. Returns the template that was applied, if any.
pub fn apply_selection_opts(
    session: &mut Session,
    scanner: &mut Scanner,
    root: &Path,
    opts: &SelectionOpts,
) -> Result<Option<Template>> {
    if opts.is_empty() || opts.all {
        scanner.select_all(true);
    }

    let mut applied = None;
    if let Some(name) = &opts.template {
        let template = session.templates()?.require(name)?.clone();
        let count = scanner.apply_template(&template);
        log::info!("Template '{}' selected {} files", name, count);
        session.update_config(|c| c.add_recent_template(name))?;
        applied = Some(template);
    }

    if !opts.globs.is_empty() {
        let count = scanner
            .select_matching_globs(&opts.globs)
            .context("Failed to apply glob selection")?;
        log::info!("Glob patterns selected {} files", count);
    }

    if let Some(csv) = &opts.from_csv {
        let paths = load_selection_csv(csv, root)
            .with_context(|| format!("Failed to read selection from {}", csv.display()))?;
        let report = apply_selection(scanner, &paths);
        log::info!("CSV selected {} files", report.matched);
        for missing in &report.missing {
            log::warn!("Not in scan: {}", missing.display());
        }
    }

    if let Some(text) = &opts.search {
        let matches: Vec<PathBuf> = scanner
            .filter(text)
            .into_iter()
            .map(|f| f.path.clone())
            .collect();
        let count = scanner.set_selected(&matches, true);
        log::info!("Search '{}' selected {} files", text, count);
    }

    Ok(applied)
}

pub fn parse_group_by(value: &str) -> Option<GroupBy> {
    match value {
        "folder" => Some(GroupBy::Folder),
        "layer" => Some(GroupBy::Layer),
        _ => None,
    }
}
