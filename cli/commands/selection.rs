use crate::cli_args::SelectionAction;
use crate::output::{print_json, print_success, relative_display};
use crate::{Session, apply_selection_opts, scan_project};
use anyhow::{Context, Result};
use codepack_core::{apply_selection, load_selection_csv, save_selection_csv};
use colored::*;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LoadReport {
    matched: usize,
    selected: Vec<String>,
    missing: Vec<String>,
}

pub fn handle_selection_command(
    action: SelectionAction,
    session: &mut Session,
    quiet: bool,
) -> Result<()> {
    match action {
        SelectionAction::Save {
            csv,
            scan,
            selection,
        } => {
            let (root, mut scanner) = scan_project(session, &scan)?;
            apply_selection_opts(session, &mut scanner, &root, &selection)?;
            let written = save_selection_csv(scanner.files(), &root, &csv)
                .with_context(|| format!("Failed to write selection to {}", csv.display()))?;
            print_success(
                &format!(
                    "{} selected files saved to {}",
                    written,
                    csv.display().to_string().blue()
                ),
                quiet,
            );
        }
        SelectionAction::Load { csv, scan, format } => {
            let (root, mut scanner) = scan_project(session, &scan)?;
            let paths = load_selection_csv(&csv, &root)
                .with_context(|| format!("Failed to read selection from {}", csv.display()))?;
            let report = apply_selection(&mut scanner, &paths);
            let load_report = LoadReport {
                matched: report.matched,
                selected: scanner
                    .selected_files()
                    .iter()
                    .map(|f| relative_display(&f.path, &root))
                    .collect(),
                missing: report
                    .missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
            };

            if format.is_json() {
                return print_json(&load_report);
            }
            for path in &load_report.selected {
                println!("{} {}", "+".green(), path);
            }
            for path in &load_report.missing {
                println!("{} {}", "?".yellow(), path.dimmed());
            }
            if !quiet {
                println!(
                    "{} of {} listed files found in the scan.",
                    load_report.matched.to_string().cyan(),
                    paths.len().to_string().cyan()
                );
            }
        }
    }
    Ok(())
}
