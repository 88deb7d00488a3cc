//! Chronological replay of request log lines
//!
//! Log store delivery order does not follow wall-clock order across shards,
//! so events are sorted (stable on ties) before the arrival/completion state
//! machine runs over them.

use super::protocol::{self, LineKind};
use crate::models::{LogEvent, RequestId, RequestInterval};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Intervals reconstructed from one window of log events
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    intervals: BTreeMap<RequestId, RequestInterval>,
    orphan_completions: Vec<RequestId>,
    malformed_lines: usize,
    duplicate_arrivals: usize,
}

impl Timeline {
    /// All intervals seen in the window, active ones included
    pub fn intervals(&self) -> &BTreeMap<RequestId, RequestInterval> {
        &self.intervals
    }

    pub fn get(&self, request_id: RequestId) -> Option<&RequestInterval> {
        self.intervals.get(&request_id)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &RequestInterval> {
        self.intervals.values().filter(|i| i.is_completed())
    }

    pub fn active(&self) -> impl Iterator<Item = &RequestInterval> {
        self.intervals.values().filter(|i| i.is_active())
    }

    /// Request IDs whose completion arrived without a recorded arrival
    pub fn orphan_completions(&self) -> &[RequestId] {
        &self.orphan_completions
    }

    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// Arrivals that overwrote an earlier arrival for the same ID
    pub fn duplicate_arrivals(&self) -> usize {
        self.duplicate_arrivals
    }
}

/// Rebuild per-request intervals for one service from an unordered batch
pub fn reconstruct(service: &str, mut events: Vec<LogEvent>) -> Timeline {
    events.sort_by_key(|e| e.timestamp_nanos);

    let mut timeline = Timeline::default();

    for event in &events {
        let line = match protocol::parse_line(&event.text) {
            Ok(line) => line,
            Err(e) => {
                timeline.malformed_lines += 1;
                debug!(service = %service, error = %e, "Skipping log line");
                continue;
            }
        };

        match line.kind {
            LineKind::Arrived => {
                let interval = timeline
                    .intervals
                    .entry(line.request_id)
                    .or_insert_with(|| RequestInterval::new(line.request_id, service));

                // Last write wins. A re-arrival reopens the request so no
                // interval ever ends before it starts.
                if interval.arrived_at.is_some() {
                    timeline.duplicate_arrivals += 1;
                    debug!(
                        service = %service,
                        request_id = line.request_id,
                        "Duplicate arrival overwrites earlier arrival"
                    );
                }
                interval.arrived_at = Some(event.timestamp_nanos);
                interval.completed_at = None;
                interval.status = None;
            }
            LineKind::Completed { status } => match timeline.intervals.get_mut(&line.request_id) {
                Some(interval) if interval.arrived_at.is_some() => {
                    interval.completed_at = Some(event.timestamp_nanos);
                    interval.status = status;
                }
                _ => {
                    timeline.orphan_completions.push(line.request_id);
                    warn!(
                        event = "orphan_completion",
                        service = %service,
                        request_id = line.request_id,
                        timestamp_nanos = event.timestamp_nanos,
                        "Completion without a recorded arrival, dropping"
                    );
                }
            },
        }
    }

    timeline
}
