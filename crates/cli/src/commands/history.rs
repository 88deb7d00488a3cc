//! Persisted scaling history

use anyhow::{Context, Result};
use colored::Colorize;
use scaler_lib::actuator::{HistoryEntry, HistoryStore, JsonFileHistoryStore, ServiceHistory};
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    format_percent, format_rate, format_seconds, print_header, print_json, print_table,
    print_warning, OutputFormat,
};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
    #[tabled(rename = "Replicas")]
    instances: u32,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Throughput")]
    throughput: String,
    #[tabled(rename = "Mean Latency")]
    latency: String,
    #[tabled(rename = "Arrived")]
    arrived: usize,
    #[tabled(rename = "Workload")]
    workload: String,
}

impl From<&HistoryEntry> for HistoryRow {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            timestamp: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            elapsed: format!("{:.0}s", entry.elapsed_seconds),
            instances: entry.instances,
            cpu: format_percent(entry.cpu_usage),
            throughput: format_rate(entry.requests_per_second),
            latency: format_seconds(entry.mean_request_time),
            arrived: entry.total_arrived_requests,
            workload: format!("{:.3}", entry.workload),
        }
    }
}

/// Keep only the newest `last` entries
fn tail(mut history: ServiceHistory, last: Option<usize>) -> ServiceHistory {
    if let Some(n) = last {
        let skip = history.history.len().saturating_sub(n);
        history.history.drain(..skip);
    }
    history
}

/// Show the persisted history of one control-plane app
pub async fn show_history(
    dir: &Path,
    app: &str,
    last: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let store = JsonFileHistoryStore::new(dir);
    let history = store
        .load(app)
        .await
        .with_context(|| format!("Failed to read {}", store.path_for(app).display()))?;
    let total = history.history.len();
    let history = tail(history, last);

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            print_header("Scaling History");
            println!("App:  {}", history.app_name.cyan());
            println!("File: {}", store.path_for(app).display());
            println!();

            if history.history.is_empty() {
                print_warning("No history recorded for this app");
                return Ok(());
            }

            print_table(history.history.iter().map(HistoryRow::from).collect());
            println!(
                "\nShowing {} of {} entries",
                history.history.len(),
                total
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn history(n: u32) -> ServiceHistory {
        let mut history = ServiceHistory::new("app1");
        for i in 0..n {
            history.history.push(HistoryEntry {
                timestamp: Utc::now(),
                elapsed_seconds: i as f64 * 30.0,
                instances: i + 1,
                cpu_usage: 0.4,
                requests_per_second: 2.0,
                mean_request_time: 0.2,
                total_arrived_requests: 100,
                workload: 0.5,
            });
        }
        history
    }

    #[test]
    fn test_tail_keeps_newest() {
        let trimmed = tail(history(5), Some(2));
        assert_eq!(trimmed.history.len(), 2);
        assert_eq!(trimmed.history[0].instances, 4);
        assert_eq!(trimmed.history[1].instances, 5);
    }

    #[test]
    fn test_tail_larger_than_history() {
        assert_eq!(tail(history(3), Some(10)).history.len(), 3);
        assert_eq!(tail(history(3), None).history.len(), 3);
    }
}
