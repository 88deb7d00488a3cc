//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a bold section header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(60));
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format seconds with millisecond precision
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.3}s", seconds)
}

/// Format a fraction as percentage
pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Format a per-second rate
pub fn format_rate(rate: f64) -> String {
    format!("{:.2}/s", rate)
}

/// Color a replica count by how many of them are available
pub fn color_availability(available: u32, instances: u32) -> String {
    let formatted = format!("{}/{}", available, instances);
    if available >= instances {
        formatted.green().to_string()
    } else if available > 0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color a loop phase or tick outcome
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "scaled" => status.blue().to_string(),
        "unchanged" | "idle" => status.green().to_string(),
        "held" | "skipped" | "collecting" | "deciding" | "actuating" => {
            status.yellow().to_string()
        }
        "actuation_failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}
