//! Agent and project configuration diagnostics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use waveorch_core::config::PROJECT_DIR_NAME;
use waveorch_core::Result;

use crate::registry::AgentRegistry;
use crate::tracker::detect_git_branch;

/// Root files in an agent config dir that count as rules
const ROOT_RULE_FILES: &[&str] = &["CLAUDE.md", "instructions.md", "config.json"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDiag {
    pub available: bool,
    pub config_found: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub rules_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDiag {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    pub has_wave_orch_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    pub timestamp: DateTime<Utc>,
    pub agents: BTreeMap<String, AgentDiag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectDiag>,
}

/// Reads agent config directories and project markers
pub struct ConfigInspector {
    registry: Arc<AgentRegistry>,
}

impl ConfigInspector {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Inspect one agent's config dir; unknown agents report nothing found
    pub fn scan_agent_config(&self, name: &str) -> AgentDiag {
        let Some(agent) = self.registry.get_agent(name) else {
            return AgentDiag::default();
        };

        let mut diag = AgentDiag {
            available: agent.available,
            ..Default::default()
        };
        if agent.config_dir.is_dir() {
            diag.config_found = true;
            diag.rules_count = count_rules(&agent.config_dir);
            diag.plugins = list_plugins(&agent.config_dir);
        }
        diag
    }

    /// Snapshot of every catalog agent, plus `project` if given
    pub fn generate_diagnostic(&self, project: Option<&Path>) -> DiagnosticSnapshot {
        let agents = self
            .registry
            .agent_names()
            .into_iter()
            .map(|name| {
                let diag = self.scan_agent_config(&name);
                (name, diag)
            })
            .collect();

        DiagnosticSnapshot {
            timestamp: Utc::now(),
            agents,
            project: project.map(scan_project),
        }
    }

    /// Write `snapshot` as pretty JSON, creating parent directories
    pub fn save_diagnostic(&self, snapshot: &DiagnosticSnapshot, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(output, data)?;
        Ok(())
    }
}

fn scan_project(path: &Path) -> ProjectDiag {
    ProjectDiag {
        path: path.to_path_buf(),
        git_branch: detect_git_branch(path),
        has_wave_orch_dir: path.join(PROJECT_DIR_NAME).is_dir(),
    }
}

/// `*.md` files under `rules/` plus known root files
fn count_rules(config_dir: &Path) -> usize {
    let rules = std::fs::read_dir(config_dir.join("rules"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
                .count()
        })
        .unwrap_or(0);

    let root = ROOT_RULE_FILES
        .iter()
        .filter(|f| config_dir.join(f).exists())
        .count();

    rules + root
}

fn list_plugins(config_dir: &Path) -> Vec<String> {
    let mut plugins: Vec<String> = std::fs::read_dir(config_dir.join("plugins"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    plugins.sort();
    plugins
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inspector(home: &Path) -> ConfigInspector {
        let registry = AgentRegistry::with_default_agents(home);
        registry.detect_with(|cmd| cmd == "claude");
        ConfigInspector::new(Arc::new(registry))
    }

    #[test]
    fn test_scan_agent_config() {
        let home = TempDir::new().unwrap();
        let claude = home.path().join(".claude");
        std::fs::create_dir_all(claude.join("rules")).unwrap();
        std::fs::create_dir_all(claude.join("plugins").join("review-kit")).unwrap();
        std::fs::create_dir_all(claude.join("plugins").join("lint")).unwrap();
        std::fs::write(claude.join("rules").join("style.md"), "# style").unwrap();
        std::fs::write(claude.join("rules").join("notes.txt"), "skip").unwrap();
        std::fs::write(claude.join("CLAUDE.md"), "# root").unwrap();

        let inspector = inspector(home.path());
        let diag = inspector.scan_agent_config("claude-code");
        assert!(diag.available);
        assert!(diag.config_found);
        assert_eq!(diag.rules_count, 2);
        assert_eq!(diag.plugins, vec!["lint", "review-kit"]);

        let codex = inspector.scan_agent_config("codex");
        assert!(!codex.available);
        assert!(!codex.config_found);

        assert_eq!(inspector.scan_agent_config("cursor"), AgentDiag::default());
    }

    #[test]
    fn test_generate_and_save_diagnostic() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::create_dir(project.path().join(".git")).unwrap();
        std::fs::write(project.path().join(".git").join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::create_dir(project.path().join(".wave-orch")).unwrap();

        let inspector = inspector(home.path());
        let snapshot = inspector.generate_diagnostic(Some(project.path()));
        assert_eq!(snapshot.agents.len(), 3);

        let project_diag = snapshot.project.as_ref().unwrap();
        assert_eq!(project_diag.git_branch.as_deref(), Some("main"));
        assert!(project_diag.has_wave_orch_dir);

        let output = home.path().join("diag").join("nested").join("snapshot.json");
        inspector.save_diagnostic(&snapshot, &output).unwrap();
        let saved: DiagnosticSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved, snapshot);

        assert!(inspector.generate_diagnostic(None).project.is_none());
    }
}
