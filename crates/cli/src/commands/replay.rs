//! Offline replay of a log dump through reconstruction and aggregation

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use colored::Colorize;
use scaler_lib::observation::{ObservationBuilder, WindowAggregator};
use scaler_lib::source::parse_query_range;
use scaler_lib::timeline::reconstruct;
use scaler_lib::{LogEvent, Observation, RawServiceConfig, ServiceScalingConfig, WindowMetrics};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tabled::Tabled;

use crate::output::{
    format_percent, format_rate, format_seconds, print_header, print_info, print_json,
    print_table, print_warning, OutputFormat,
};

/// One line of a plain dump
#[derive(Debug, Deserialize)]
struct DumpedLine {
    timestamp_nanos: i64,
    text: String,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub metrics: WindowMetrics,
    pub orphan_completions: usize,
    pub malformed_lines: usize,
    pub duplicate_arrivals: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn row(field: &str, value: impl ToString) -> FieldRow {
    FieldRow {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Parse either `[{timestamp_nanos, text}]` or a Loki `query_range` response
pub fn parse_dump(service: &str, body: &str) -> Result<Vec<LogEvent>> {
    if let Ok(lines) = serde_json::from_str::<Vec<DumpedLine>>(body) {
        return Ok(lines
            .into_iter()
            .map(|l| LogEvent::new(service, l.timestamp_nanos, l.text))
            .collect());
    }

    parse_query_range(service, body)
        .context("Input is neither a line dump nor a Loki query_range response")
}

/// Run the dump through the same pipeline the agent uses
///
/// The window ends at the newest event, so a dump replays the same way
/// regardless of when it is read. Lines older than the window are dropped.
pub fn replay(
    service: &str,
    events: Vec<LogEvent>,
    window: Duration,
    cpu: Option<f64>,
    replicas: Option<u32>,
) -> Result<ReplayReport> {
    let end_nanos = events.iter().map(|e| e.timestamp_nanos).max();
    let window_end = end_nanos
        .map(|nanos| Utc.timestamp_nanos(nanos))
        .unwrap_or_else(Utc::now);

    // Same [end - window, end] bounds the agent's log query uses
    let events: Vec<LogEvent> = match end_nanos {
        Some(end) => {
            let start = end.saturating_sub(window.as_nanos().min(i64::MAX as u128) as i64);
            events
                .into_iter()
                .filter(|e| (start..=end).contains(&e.timestamp_nanos))
                .collect()
        }
        None => events,
    };

    let timeline = reconstruct(service, events);
    let metrics = WindowAggregator::new(window).aggregate(service, &timeline, cpu, window_end);

    let observation = match replicas {
        Some(replicas) if metrics.cpu_utilization.is_some() => {
            let config = ServiceScalingConfig::try_from(RawServiceConfig::new(service))?;
            Some(ObservationBuilder::new(config).build(&metrics, replicas)?)
        }
        _ => None,
    };

    Ok(ReplayReport {
        orphan_completions: timeline.orphan_completions().len(),
        malformed_lines: timeline.malformed_lines(),
        duplicate_arrivals: timeline.duplicate_arrivals(),
        metrics,
        observation,
    })
}

pub async fn run_replay(
    file: &Path,
    service: &str,
    window: Duration,
    cpu: Option<f64>,
    replicas: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let body = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let events = parse_dump(service, &body)?;
    let line_count = events.len();
    let report = replay(service, events, window, cpu, replicas)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report, line_count),
    }

    Ok(())
}

fn print_report(report: &ReplayReport, line_count: usize) {
    let m = &report.metrics;

    print_header("Replay");
    println!("Service: {}", m.service.cyan());
    println!(
        "Window:  {} .. {}",
        m.window_start.format("%Y-%m-%d %H:%M:%S"),
        m.window_end.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    print_table(vec![
        row("Log lines", line_count),
        row("Arrived requests", m.total_arrived),
        row("Completed requests", m.completed_count),
        row("Active requests", m.active_count),
        row("Server errors", m.error_count),
        row("Mean latency", format_seconds(m.mean_latency_seconds)),
        row("Arrival rate", format_rate(m.arrival_rate)),
        row("Throughput", format_rate(m.throughput)),
        row(
            "CPU utilization",
            m.cpu_utilization
                .map(format_percent)
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);

    if report.orphan_completions > 0 {
        print_warning(&format!(
            "{} completion(s) without a matching arrival",
            report.orphan_completions
        ));
    }
    if report.malformed_lines > 0 {
        print_warning(&format!(
            "{} line(s) not in the request protocol",
            report.malformed_lines
        ));
    }

    match &report.observation {
        Some(observation) => {
            println!();
            print_header("Observation");
            print_table(
                observation
                    .features()
                    .iter()
                    .map(|(name, value)| row(name, format!("{:.4}", value)))
                    .collect(),
            );
        }
        None => print_info("Pass --cpu and --replicas to see the policy observation"),
    }
}
