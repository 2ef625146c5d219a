use crate::cli_args::ScanArgs;
use crate::output::{print_files_table, print_json, relative_display};
use crate::{Session, apply_selection_opts, scan_project};
use anyhow::{Context, Result};
use codepack_core::{FileDescriptor, GitFileStatus, GitStatusProvider, status_of};
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ScannedFile<'a> {
    #[serde(flatten)]
    file: &'a FileDescriptor,
    relative_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_status: Option<GitFileStatus>,
}

#[derive(Debug, Serialize)]
struct ScanReport<'a> {
    root: PathBuf,
    total: usize,
    selected: usize,
    files: Vec<ScannedFile<'a>>,
}

pub fn handle_scan_command(args: &ScanArgs, session: &mut Session, quiet: bool) -> Result<()> {
    let (root, mut scanner) = scan_project(session, &args.scan)?;
    apply_selection_opts(session, &mut scanner, &root, &args.selection)?;

    let git_changes = if args.git {
        if !session.config.git.enabled {
            log::warn!("Git integration is disabled in the configuration; showing status anyway");
        }
        let mut provider =
            GitStatusProvider::new(Duration::from_secs(session.config.git.cache_timeout));
        Some(
            provider
                .check_changes(&root)
                .context("Failed to read git status")?
                .clone(),
        )
    } else {
        None
    };

    let files: Vec<&FileDescriptor> = scanner
        .files()
        .iter()
        .filter(|f| !args.selected || f.is_selected)
        .collect();

    if args.format.is_json() {
        let report = ScanReport {
            root: root.clone(),
            total: scanner.files().len(),
            selected: scanner.files().iter().filter(|f| f.is_selected).count(),
            files: files
                .iter()
                .map(|&file| ScannedFile {
                    file,
                    relative_path: relative_display(&file.path, &root),
                    git_status: git_changes.as_ref().map(|c| status_of(c, &file.path)),
                })
                .collect(),
        };
        return print_json(&report);
    }

    if files.is_empty() {
        if !quiet {
            println!("{}", "No matching files found.".yellow());
        }
        return Ok(());
    }
    print_files_table(&files, &root, git_changes.as_ref());
    if !quiet {
        println!(
            "{} files, {} selected under {}",
            scanner.files().len().to_string().cyan(),
            scanner
                .files()
                .iter()
                .filter(|f| f.is_selected)
                .count()
                .to_string()
                .cyan(),
            root.display().to_string().blue()
        );
    }
    Ok(())
}
