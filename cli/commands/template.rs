use crate::cli_args::{ScanOpts, SelectionOpts, TemplateAction};
use crate::output::{
    print_files_table, print_json, print_success, print_template_details, print_templates_table,
    relative_display, write_to_stdout,
};
use crate::{Session, apply_selection_opts, parse_group_by, scan_project};
use anyhow::{Context, Result};
use codepack_core::{AppError, ExportSettings, FileDescriptor};
use colored::*;

pub fn handle_template_command(
    action: TemplateAction,
    session: &mut Session,
    quiet: bool,
) -> Result<()> {
    let mut store = session.templates()?;
    match action {
        TemplateAction::List { format } => {
            if format.is_json() {
                let all: Vec<_> = store.list().collect();
                return print_json(&all);
            }
            if store.list().next().is_none() {
                if !quiet {
                    println!(
                        "No templates saved in {}",
                        store.dir().display().to_string().blue()
                    );
                }
                return Ok(());
            }
            print_templates_table(store.list());
        }
        TemplateAction::Show { name, format } => {
            let template = store.require(&name)?;
            if format.is_json() {
                write_to_stdout(&template.to_json()?)?;
            } else {
                print_template_details(template);
            }
        }
        TemplateAction::Create {
            name,
            description,
            scan,
            selection,
            group_by,
            custom_naming,
        } => {
            let selected = selected_files(session, &scan, &selection)?;
            if selected.is_empty() {
                anyhow::bail!(AppError::InvalidArgument(
                    "No files selected to derive the template from".to_string()
                ));
            }
            let settings = ExportSettings {
                group_by: group_by.as_deref().and_then(parse_group_by),
                custom_naming,
            };
            let template = store
                .create(&name, &description, &selected, Some(settings))
                .with_context(|| format!("Failed to create template '{}'", name))?;
            session.update_config(|c| c.add_recent_template(&name))?;
            print_success(
                &format!(
                    "Template {} created from {} files ({} extensions, {} folders, {} layers)",
                    template.name.cyan(),
                    selected.len(),
                    template.file_patterns.len(),
                    template.folder_patterns.len(),
                    template.layer_patterns.len()
                ),
                quiet,
            );
        }
        TemplateAction::Update {
            name,
            description,
            scan,
            selection,
            group_by,
            custom_naming,
        } => {
            let current = store.require(&name)?.export_settings.clone();
            let settings = (group_by.is_some() || custom_naming.is_some()).then(|| ExportSettings {
                group_by: match &group_by {
                    Some(mode) => parse_group_by(mode),
                    None => current.group_by,
                },
                custom_naming: custom_naming.unwrap_or(current.custom_naming),
            });
            let reselected = if selection.is_empty() {
                None
            } else {
                Some(selected_files(session, &scan, &selection)?)
            };
            store
                .update(&name, description.as_deref(), reselected.as_deref(), settings)
                .with_context(|| format!("Failed to update template '{}'", name))?;
            print_success(&format!("Template {} updated", name.cyan()), quiet);
        }
        TemplateAction::Delete { name } => {
            store
                .delete(&name)
                .with_context(|| format!("Failed to delete template '{}'", name))?;
            print_success(&format!("Template {} deleted", name.cyan()), quiet);
        }
        TemplateAction::Export { name, path } => {
            store
                .export_to(&name, &path)
                .with_context(|| format!("Failed to export template '{}'", name))?;
            print_success(
                &format!(
                    "Template {} written to {}",
                    name.cyan(),
                    path.display().to_string().blue()
                ),
                quiet,
            );
        }
        TemplateAction::Import { path } => {
            let template = store
                .import_from(&path)
                .with_context(|| format!("Failed to import template from {}", path.display()))?;
            print_success(
                &format!("Template imported as {}", template.name.cyan()),
                quiet,
            );
        }
        TemplateAction::Match { name, scan, format } => {
            let template = store.require(&name)?.clone();
            let (root, scanner) = scan_project(session, &scan)?;
            let matches = store.find_matching_files(&template, scanner.files());
            if format.is_json() {
                let paths: Vec<String> = matches
                    .iter()
                    .map(|f| relative_display(&f.path, &root))
                    .collect();
                return print_json(&paths);
            }
            if matches.is_empty() {
                if !quiet {
                    println!("{}", "Template matches no scanned files.".yellow());
                }
                return Ok(());
            }
            let rows: Vec<&FileDescriptor> = matches.iter().collect();
            print_files_table(&rows, &root, None);
        }
    }
    Ok(())
}

fn selected_files(
    session: &mut Session,
    scan: &ScanOpts,
    selection: &SelectionOpts,
) -> Result<Vec<FileDescriptor>> {
    let (root, mut scanner) = scan_project(session, scan)?;
    apply_selection_opts(session, &mut scanner, &root, selection)?;
    Ok(scanner.selected_files())
}
