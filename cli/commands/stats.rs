use crate::cli_args::StatsArgs;
use crate::output::{print_json, readable_size};
use crate::{Session, apply_selection_opts, scan_project};
use anyhow::Result;
use codepack_core::{FileDescriptor, SelectionStats};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::fs;
use tiktoken_rs::cl100k_base;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub stats: SelectionStats,
    pub total_size: String,
    pub selected_size: String,
    pub estimated_tokens: usize,
}

pub fn handle_stats_command(args: &StatsArgs, session: &mut Session, _quiet: bool) -> Result<()> {
    let (root, mut scanner) = scan_project(session, &args.scan)?;
    apply_selection_opts(session, &mut scanner, &root, &args.selection)?;

    let stats = SelectionStats::compute(scanner.files());
    let estimated_tokens = estimate_tokens(&scanner.selected_files())?;
    let report = StatsReport {
        total_size: readable_size(stats.total_bytes),
        selected_size: readable_size(stats.selected_bytes),
        stats,
        estimated_tokens,
    };

    if args.format.is_json() {
        print_json(&report)
    } else {
        print_stats_pretty(&report);
        Ok(())
    }
}

/// cl100k token count over the readable selected files.
fn estimate_tokens(files: &[FileDescriptor]) -> Result<usize> {
    let bpe = cl100k_base().map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
    let mut total = 0;
    for file in files {
        match fs::read_to_string(&file.path) {
            Ok(content) => total += bpe.encode_ordinary(&content).len(),
            Err(e) => log::warn!("Skipping {} in token estimate: {}", file.path.display(), e),
        }
    }
    Ok(total)
}

fn print_stats_pretty(report: &StatsReport) {
    println!();
    println!("{}", " Selection Statistics ".green().bold().underline());
    println!(
        "{:<20} {}",
        "Total Files:".green(),
        report.stats.total_files.to_string().cyan()
    );
    println!(
        "{:<20} {}",
        "Selected Files:".green(),
        report.stats.selected_files.to_string().cyan()
    );
    println!("{:<20} {}", "Total Size:".green(), report.total_size.cyan());
    println!(
        "{:<20} {}",
        "Selected Size:".green(),
        report.selected_size.cyan()
    );
    println!(
        "{:<20} {}",
        "Est. Tokens:".green(),
        report.estimated_tokens.to_string().cyan()
    );

    if report.stats.by_extension.is_empty() {
        println!("\n{}", "(No files scanned)".yellow());
    } else {
        println!("\n{}", " Files by Extension ".green().bold().underline());
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Extension").fg(Color::Green),
            Cell::new("Files").fg(Color::Green),
        ]);
        for (extension, count) in &report.stats.by_extension {
            table.add_row(vec![
                Cell::new(extension).fg(Color::Cyan),
                Cell::new(count).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("{table}");
    }
    println!();
}
