use anyhow::{Context, Result};
use byte_unit::{Byte, UnitType};
use codepack_core::{FileDescriptor, GitChanges, Template, status_of};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

pub fn readable_size(bytes: u64) -> String {
    Byte::from_u64(bytes)
        .get_appropriate_unit(UnitType::Binary)
        .to_string()
}

pub fn relative_display(path: &Path, root: &Path) -> String {
    pathdiff::diff_paths(path, root)
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

pub fn print_json<T: Serialize + ?Sized>(data: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(data).context("Failed to serialize output")?;
    write_to_stdout(&content)
}

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{} {}", "✅".green(), message);
    }
}

pub fn print_files_table(files: &[&FileDescriptor], root: &Path, git: Option<&GitChanges>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![
        Cell::new("Path").fg(Color::Green),
        Cell::new("Layer").fg(Color::Green),
        Cell::new("Size").fg(Color::Green),
        Cell::new("Selected").fg(Color::Green),
    ];
    if git.is_some() {
        header.push(Cell::new("Git").fg(Color::Green));
    }
    table.set_header(header);

    for file in files {
        let mut row = vec![
            Cell::new(relative_display(&file.path, root)).fg(Color::Cyan),
            Cell::new(file.layer_name.as_deref().unwrap_or("-")),
            Cell::new(readable_size(file.size))
                .set_alignment(CellAlignment::Right)
                .fg(Color::DarkGrey),
            Cell::new(if file.is_selected { "yes" } else { "" }),
        ];
        if let Some(changes) = git {
            row.push(Cell::new(status_of(changes, &file.path).to_string()));
        }
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_templates_table<'a>(templates: impl Iterator<Item = &'a Template>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::Green),
        Cell::new("Description").fg(Color::Green),
        Cell::new("Extensions").fg(Color::Green),
        Cell::new("Folders").fg(Color::Green),
        Cell::new("Layers").fg(Color::Green),
        Cell::new("Group By").fg(Color::Green),
    ]);
    for template in templates {
        table.add_row(vec![
            Cell::new(&template.name).fg(Color::Cyan),
            Cell::new(&template.description),
            Cell::new(template.file_patterns.join(", ")),
            Cell::new(template.folder_patterns.join(", ")),
            Cell::new(template.layer_patterns.join(", ")),
            Cell::new(
                template
                    .export_settings
                    .group_by
                    .map_or_else(|| "none".to_string(), |g| g.to_string()),
            ),
        ]);
    }
    println!("{table}");
}

pub fn print_template_details(template: &Template) {
    let list = |values: &[String]| {
        if values.is_empty() {
            "(any)".dimmed().to_string()
        } else {
            values.join(", ").cyan().to_string()
        }
    };
    println!("{:<16} {}", "Name:".green(), template.name.cyan().bold());
    println!("{:<16} {}", "Description:".green(), template.description);
    println!("{:<16} {}", "Extensions:".green(), list(&template.file_patterns));
    println!("{:<16} {}", "Folders:".green(), list(&template.folder_patterns));
    println!("{:<16} {}", "Layers:".green(), list(&template.layer_patterns));
    println!(
        "{:<16} {}",
        "Group By:".green(),
        template
            .export_settings
            .group_by
            .map_or_else(|| "none".to_string(), |g| g.to_string())
    );
    println!(
        "{:<16} {}",
        "Custom Naming:".green(),
        template.export_settings.custom_naming
    );
}
