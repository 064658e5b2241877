//! Per-project round history
//!
//! One [`ProjectState`] per distinct project path, created on first
//! registration and never implicitly removed. Snapshots written to disk are
//! redacted copies; the in-memory history keeps the original text.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;
use waveorch_core::{redact, OrchConfig, ProjectState, Report, Result};

/// Default number of reports kept per project
pub const DEFAULT_MAX_REPORTS: usize = 50;

/// File name of the per-project snapshot inside `.wave-orch/`
pub const STATE_FILE_NAME: &str = "state.json";

/// Tracks round progress for every project the engine has touched
#[derive(Debug)]
pub struct ProjectTracker {
    projects: RwLock<HashMap<PathBuf, ProjectState>>,
    max_reports: usize,
}

impl Default for ProjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectTracker {
    pub fn new() -> Self {
        Self::with_max_reports(DEFAULT_MAX_REPORTS)
    }

    /// Tracker keeping at most `max_reports` reports per project (0 = unlimited)
    pub fn with_max_reports(max_reports: usize) -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            max_reports,
        }
    }

    pub fn max_reports(&self) -> usize {
        self.max_reports
    }

    /// Return the existing record or create one with status `registered`
    pub async fn register_project(&self, path: &Path) -> ProjectState {
        if let Some(state) = self.get_project(path).await {
            return state;
        }

        // Read HEAD before taking the write lock
        let branch = read_git_branch(path).await;

        let mut projects = self.projects.write().await;
        if let Some(state) = projects.get(path) {
            return state.clone();
        }

        let mut state = ProjectState::new(path);
        if let Some(branch) = branch {
            state.branch = branch;
        }
        debug!("Registered project {} (branch: {})", state.name, state.branch);

        projects.insert(path.to_path_buf(), state.clone());
        state
    }

    pub async fn get_project(&self, path: &Path) -> Option<ProjectState> {
        self.projects.read().await.get(path).cloned()
    }

    pub async fn list_projects(&self) -> Vec<ProjectState> {
        self.projects.read().await.values().cloned().collect()
    }

    /// Record a finished round; unknown paths are ignored
    pub async fn update_round(&self, path: &Path, round: u32, report: Option<Report>) {
        let mut projects = self.projects.write().await;
        let Some(state) = projects.get_mut(path) else {
            return;
        };

        state.last_round = round;
        state.total_rounds += 1;
        state.updated_at = Utc::now();

        if let Some(report) = report {
            state.reports.push(report);
            if self.max_reports > 0 && state.reports.len() > self.max_reports {
                let excess = state.reports.len() - self.max_reports;
                state.reports.drain(..excess);
            }
        }
    }

    pub async fn set_status(&self, path: &Path, status: &str) {
        if let Some(state) = self.projects.write().await.get_mut(path) {
            state.status = status.to_string();
            state.updated_at = Utc::now();
        }
    }

    pub async fn set_branch(&self, path: &Path, branch: &str) {
        if let Some(state) = self.projects.write().await.get_mut(path) {
            state.branch = branch.to_string();
            state.updated_at = Utc::now();
        }
    }

    /// Write a redacted snapshot to `<project>/.wave-orch/state.json`
    ///
    /// Returns the written path, or `None` for unregistered projects.
    pub async fn save_to_file(&self, path: &Path) -> Result<Option<PathBuf>> {
        let Some(mut snapshot) = self.get_project(path).await else {
            return Ok(None);
        };
        snapshot.reports = snapshot.reports.iter().map(redact_report).collect();

        let orch_dir = OrchConfig::project_dir(path);
        fs::create_dir_all(&orch_dir).await?;
        restrict_permissions(&orch_dir, 0o700).await?;

        let file = orch_dir.join(STATE_FILE_NAME);
        let data = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&file, data).await?;
        restrict_permissions(&file, 0o600).await?;

        debug!("Saved project snapshot to {:?}", file);
        Ok(Some(file))
    }
}

/// Copy of `report` with every free-text field passed through the redactor
pub fn redact_report(report: &Report) -> Report {
    let mut out = report.clone();
    out.summary = redact(&report.summary);
    out.actions = redact_all(&report.actions);
    out.commands_run = report.commands_run.as_deref().map(redact_all);
    out.risks = redact_all(&report.risks);
    out.next_actions = redact_all(&report.next_actions);
    out.needs_human_reason = report.needs_human_reason.as_deref().map(redact);
    if let Some(files) = out.files_changed.as_mut() {
        for change in files {
            change.summary = change.summary.as_deref().map(redact);
        }
    }
    out
}

fn redact_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| redact(s)).collect()
}

/// Current branch from `<project>/.git/HEAD`, if it names one
pub fn detect_git_branch(project: &Path) -> Option<String> {
    let head = std::fs::read_to_string(project.join(".git").join("HEAD")).ok()?;
    branch_from_head(&head)
}

async fn read_git_branch(project: &Path) -> Option<String> {
    let head = fs::read_to_string(project.join(".git").join("HEAD")).await.ok()?;
    branch_from_head(&head)
}

fn branch_from_head(head: &str) -> Option<String> {
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_string)
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
