//! Report block protocol
//!
//! Agents embed one JSON report in their free-form output between literal
//! markers:
//!
//! ```text
//! ...agent chatter...
//! <<<REPORT>>>
//! {"project_id": "app", "agent": "codex", "round": 1, "status": "SUCCESS", ...}
//! <<<END_REPORT>>>
//! ```
//!
//! Only the first block is honored.

use regex::Regex;
use std::sync::OnceLock;
use waveorch_core::{OrchError, Report, ReportStatus, Result, ValidationError};

/// Start of a report block
pub const START_MARKER: &str = "<<<REPORT>>>";
/// End of a report block
pub const END_MARKER: &str = "<<<END_REPORT>>>";

/// Extracts and decodes report blocks from agent output
#[derive(Debug, Clone)]
pub struct ReportParser {
    start_marker: String,
    end_marker: String,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser {
    pub fn new() -> Self {
        Self::with_markers(START_MARKER, END_MARKER)
    }

    pub fn with_markers(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start_marker: start.into(),
            end_marker: end.into(),
        }
    }

    /// Trimmed text of the first block, or empty if there is none
    pub fn extract_json<'a>(&self, output: &'a str) -> &'a str {
        let Some(start) = output.find(&self.start_marker) else {
            return "";
        };
        let body_start = start + self.start_marker.len();
        match output[body_start..].find(&self.end_marker) {
            Some(len) => output[body_start..body_start + len].trim(),
            None => "",
        }
    }

    /// Decode the first block
    ///
    /// `Ok(None)` when no block is present; `ReportDecode` when a block is
    /// present but is not a well-formed report.
    pub fn parse(&self, output: &str) -> Result<Option<Report>> {
        let json = self.extract_json(output);
        if json.is_empty() {
            return Ok(None);
        }

        serde_json::from_str(json)
            .map(Some)
            .map_err(|e| OrchError::ReportDecode(e.to_string()))
    }

    /// Both markers appear somewhere in the output
    pub fn contains_report(&self, output: &str) -> bool {
        output.contains(&self.start_marker) && output.contains(&self.end_marker)
    }
}

/// Wrap a report in a block, the way an agent is asked to emit it
pub fn format_report_block(report: &Report) -> Result<String> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(format!("{}\n{}\n{}", START_MARKER, json, END_MARKER))
}

/// Lenient check: agent named and status one of the four known values
pub fn validate_report(report: Option<&Report>) -> bool {
    report.is_some_and(|r| !r.agent.is_empty() && r.status_kind().is_some())
}

/// Full field check; the first violated rule is returned
pub fn validate_report_strict(report: Option<&Report>) -> std::result::Result<(), ValidationError> {
    let Some(report) = report else {
        return Err(ValidationError::new("report", "report is missing"));
    };

    if report.project_id.is_empty() {
        return Err(ValidationError::new("project_id", "project_id must not be empty"));
    }
    if report.agent.is_empty() {
        return Err(ValidationError::new("agent", "agent must not be empty"));
    }
    if report.round <= 0 {
        return Err(ValidationError::new(
            "round",
            format!("round must be positive, got {}", report.round),
        ));
    }
    if report.status.is_empty() {
        return Err(ValidationError::new("status", "status must not be empty"));
    }
    if report.status_kind().is_none() {
        let allowed: Vec<&str> = ReportStatus::ALL.iter().map(|s| s.as_str()).collect();
        return Err(ValidationError::new(
            "status",
            format!(
                "invalid status '{}', expected one of {}",
                report.status,
                allowed.join("|")
            ),
        ));
    }
    if report.summary.is_empty() {
        return Err(ValidationError::new("summary", "summary must not be empty"));
    }
    if report.files_changed.is_none() {
        return Err(ValidationError::new(
            "files_changed",
            "files_changed must be present (use [] when nothing changed)",
        ));
    }
    if report.commands_run.is_none() {
        return Err(ValidationError::new(
            "commands_run",
            "commands_run must be present (use [] when nothing ran)",
        ));
    }
    if report.needs_human && report.needs_human_reason.as_deref().unwrap_or("").is_empty() {
        return Err(ValidationError::new(
            "needs_human_reason",
            "needs_human_reason is required when needs_human is true",
        ));
    }

    Ok(())
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""status"\s*:\s*"(SUCCESS|FAIL|BLOCKED|PARTIAL)""#)
            .expect("status pattern must compile")
    })
}

/// Peek at a report status without decoding the block
pub fn quick_status(output: &str) -> Option<ReportStatus> {
    status_pattern()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
