//! Request log line protocol (v1)
//!
//! Workload services emit exactly two line shapes per request, each carrying
//! one integer field:
//!
//! ```text
//! ID: <id> request arrived
//! ID: <id> request completed with status <code>
//! ```
//!
//! Anything else (including lines with an ID but neither marker) is a
//! malformed line and is skipped by the reconstructor.

use crate::error::{Result, ScalerError};
use crate::models::RequestId;
use regex::Regex;
use std::sync::OnceLock;

pub const ARRIVAL_MARKER: &str = "request arrived";
pub const COMPLETION_MARKER: &str = "request completed";

/// Kind of a protocol line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Arrived,
    Completed { status: Option<u16> },
}

/// A log line decoded into protocol terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLine {
    pub request_id: RequestId,
    pub kind: LineKind,
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ID: (\d+)").expect("valid request id pattern"))
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"with status (\d{3})").expect("valid status pattern"))
}

/// Extract the integer following the literal `ID: ` marker
pub fn extract_request_id(text: &str) -> Option<RequestId> {
    id_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_status(text: &str) -> Option<u16> {
    status_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Decode one log line
pub fn parse_line(text: &str) -> Result<ProtocolLine> {
    let request_id = extract_request_id(text)
        .ok_or_else(|| ScalerError::MalformedLogLine(format!("no request id in {:?}", text)))?;

    // Arrival wins if a line somehow carries both markers
    let kind = if text.contains(ARRIVAL_MARKER) {
        LineKind::Arrived
    } else if text.contains(COMPLETION_MARKER) {
        LineKind::Completed {
            status: extract_status(text),
        }
    } else {
        return Err(ScalerError::MalformedLogLine(format!(
            "request {} line has no protocol marker",
            request_id
        )));
    };

    Ok(ProtocolLine { request_id, kind })
}

/// Render an arrival line
pub fn arrival_line(request_id: RequestId) -> String {
    format!("ID: {} {}", request_id, ARRIVAL_MARKER)
}

/// Render a completion line
pub fn completion_line(request_id: RequestId, status: u16) -> String {
    format!("ID: {} {} with status {}", request_id, COMPLETION_MARKER, status)
}
