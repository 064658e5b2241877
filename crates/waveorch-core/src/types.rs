//! Core type definitions for Wave-Orch orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lifecycle status of a single task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never run again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// One unit of work handed to an external coding agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_path: PathBuf,
    pub prompt: String,
    pub agent: String,
    pub status: TaskStatus,
    pub round: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set if and only if the task is terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    /// Handle of the terminal block the agent runs in, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        project_path: impl Into<PathBuf>,
        prompt: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_path: project_path.into(),
            prompt: prompt.into(),
            agent: agent.into(),
            status: TaskStatus::Pending,
            round: 1,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            report: None,
            block_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Closed set of outcomes an agent may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Success,
    Fail,
    Blocked,
    Partial,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [Self::Success, Self::Fail, Self::Blocked, Self::Partial];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Blocked => "BLOCKED",
            Self::Partial => "PARTIAL",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    /// Wire values are exact; `success` is not `SUCCESS`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid report status: {}", s))
    }
}

/// What happened to a file during a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Structured outcome an agent emits inside a `<<<REPORT>>>` block
///
/// `status` stays a plain string on the wire so that strict validation can
/// tell an empty status apart from an unknown one; use [`Report::status_kind`]
/// for the typed value. `files_changed` and `commands_run` distinguish
/// "absent" (`None`) from "empty" (`Some(vec![])`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub round: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<Vec<FileChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands_run: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
    #[serde(default)]
    pub needs_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_human_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<String>,
}

impl Report {
    /// Typed status, `None` when the wire value is empty or unknown
    pub fn status_kind(&self) -> Option<ReportStatus> {
        self.status.parse().ok()
    }
}

/// Catalog entry describing one external coding agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub exec_cmd: String,
    pub config_dir: PathBuf,
    /// Template wrapping the task prompt; `{prompt}` marks the insertion point
    #[serde(default)]
    pub prompt_template: String,
    pub report_instruction: String,
    pub timeout_secs: u64,
    pub capabilities: Vec<String>,
    /// Probed from PATH, never declared
    #[serde(default)]
    pub available: bool,
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Build the full prompt sent to the agent, ending with the report contract
    pub fn build_prompt(&self, task_prompt: &str) -> String {
        let body = if self.prompt_template.contains("{prompt}") {
            self.prompt_template.replace("{prompt}", task_prompt)
        } else {
            task_prompt.to_string()
        };

        if self.report_instruction.is_empty() {
            body
        } else {
            format!("{}\n\n{}", body, self.report_instruction)
        }
    }
}

/// Per-project round history and status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub branch: String,
    pub last_round: u32,
    pub total_rounds: u32,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Oldest first; capped by the tracker
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<Report>,
}

impl ProjectState {
    pub fn new(path: &Path) -> Self {
        let now = Utc::now();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path: path.to_path_buf(),
            name,
            branch: String::new(),
            last_round: 0,
            total_rounds: 0,
            status: "registered".to_string(),
            started_at: now,
            updated_at: now,
            reports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_roundtrip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            let parsed: TaskStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_report_status_is_case_sensitive() {
        assert_eq!("BLOCKED".parse::<ReportStatus>(), Ok(ReportStatus::Blocked));
        assert!("blocked".parse::<ReportStatus>().is_err());
        assert!("".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn test_report_distinguishes_absent_and_empty_lists() {
        let absent: Report = serde_json::from_str(r#"{"agent":"codex"}"#).unwrap();
        assert!(absent.files_changed.is_none());
        assert!(absent.commands_run.is_none());

        let empty: Report =
            serde_json::from_str(r#"{"files_changed":[],"commands_run":[]}"#).unwrap();
        assert_eq!(empty.files_changed, Some(vec![]));
        assert_eq!(empty.commands_run, Some(vec![]));
    }

    #[test]
    fn test_report_null_reason_decodes_as_none() {
        let report: Report =
            serde_json::from_str(r#"{"needs_human": false, "needs_human_reason": null}"#)
                .unwrap();
        assert!(!report.needs_human);
        assert_eq!(report.needs_human_reason, None);
    }

    #[test]
    fn test_build_prompt_appends_instruction() {
        let agent = AgentConfig {
            name: "codex".into(),
            exec_cmd: "codex".into(),
            config_dir: PathBuf::from("/home/u/.codex"),
            prompt_template: "Project task:\n{prompt}".into(),
            report_instruction: "Emit a report.".into(),
            timeout_secs: 420,
            capabilities: vec!["code".into()],
            available: false,
        };

        let prompt = agent.build_prompt("fix the build");
        assert!(prompt.starts_with("Project task:\nfix the build"));
        assert!(prompt.ends_with("Emit a report."));
        assert_eq!(agent.timeout(), Duration::from_secs(420));
        assert!(agent.has_capability("code"));
        assert!(!agent.has_capability("review"));
    }

    #[test]
    fn test_project_state_defaults() {
        let state = ProjectState::new(Path::new("/work/my-app"));
        assert_eq!(state.name, "my-app");
        assert_eq!(state.status, "registered");
        assert_eq!(state.total_rounds, 0);
        assert!(state.reports.is_empty());
    }
}
