use crate::cli_args::ExportArgs;
use crate::output::print_success;
use crate::{Session, apply_selection_opts, parse_group_by, scan_project};
use anyhow::{Context, Result};
use codepack_core::{AppError, Exporter};
use colored::*;

pub fn handle_export_command(args: &ExportArgs, session: &mut Session, quiet: bool) -> Result<()> {
    let (root, mut scanner) = scan_project(session, &args.scan)?;
    let template = apply_selection_opts(session, &mut scanner, &root, &args.selection)?;

    let selected = scanner.selected_files();
    if selected.is_empty() {
        anyhow::bail!(AppError::InvalidArgument(
            "No files selected for export".to_string()
        ));
    }

    // Explicit flags win over the template's export settings.
    let group_by = match (&args.group_by, &template) {
        (Some(mode), _) => parse_group_by(mode),
        (None, Some(t)) => t.export_settings.group_by,
        (None, None) => None,
    };
    let name = args.name.clone().or_else(|| {
        template
            .as_ref()
            .filter(|t| t.export_settings.custom_naming)
            .map(|t| t.name.clone())
    });
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| session.config.export_directory.clone())
        .unwrap_or_else(|| session.dirs.exports.clone());

    log::info!(
        "Exporting {} files to {} (group by: {})",
        selected.len(),
        output_dir.display(),
        group_by.map_or_else(|| "none".to_string(), |g| g.to_string())
    );
    let exporter = Exporter::new(scanner.options().registry.clone());
    let produced = exporter
        .export_files(&selected, &output_dir, group_by, name.as_deref())
        .with_context(|| format!("Failed to export files to {}", output_dir.display()))?;

    let export_dir = output_dir.canonicalize().unwrap_or(output_dir);
    session.update_config(|c| {
        c.add_recent_directory(&root);
        c.export_directory = Some(export_dir);
    })?;

    for (group, path) in &produced {
        print_success(
            &format!(
                "{} -> {}",
                group.cyan(),
                path.display().to_string().blue()
            ),
            quiet,
        );
    }
    if !quiet {
        println!(
            "Exported {} files into {} file(s).",
            selected.len().to_string().cyan(),
            produced.len().to_string().cyan()
        );
    }
    Ok(())
}
