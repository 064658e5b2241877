//! Catalog of supported coding agents
//!
//! The catalog is fixed at init; only the `available` flag changes afterwards,
//! refreshed by probing PATH for each agent's command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use waveorch_core::AgentConfig;

/// Default per-agent timeout (7 minutes)
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 7 * 60;

/// Report contract appended to every agent prompt
pub const DEFAULT_REPORT_INSTRUCTION: &str = r#"When you finish each round you MUST output a JSON report in exactly this format:
<<<REPORT>>>
{
  "project_id": "project identifier",
  "agent": "your agent name",
  "round": 1,
  "status": "SUCCESS|FAIL|BLOCKED|PARTIAL",
  "summary": "one sentence summary",
  "actions": ["actions you performed"],
  "files_changed": [{"path": "file path", "action": "create|modify|delete", "summary": "short description"}],
  "commands_run": ["commands you ran"],
  "tests": {"passed": 0, "failed": 0, "skipped": 0},
  "risks": [],
  "needs_human": false,
  "needs_human_reason": null,
  "next_actions": ["suggested next steps"]
}
<<<END_REPORT>>>"#;

/// Registry of agent configurations keyed by name
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<BTreeMap<String, AgentConfig>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the default catalog
    pub fn with_default_agents(home: &Path) -> Self {
        let registry = Self::new();
        registry.init_default_agents(home);
        registry
    }

    /// Populate the built-in catalog; config dirs are resolved under `home`
    pub fn init_default_agents(&self, home: &Path) {
        let catalog = [
            ("claude-code", "claude", ".claude", &["code", "test", "review"][..]),
            ("codex", "codex", ".codex", &["code", "test"][..]),
            ("gemini", "gemini", ".gemini", &["code", "review"][..]),
        ];

        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        for (name, cmd, dir, capabilities) in catalog {
            agents.insert(
                name.to_string(),
                AgentConfig {
                    name: name.to_string(),
                    exec_cmd: cmd.to_string(),
                    config_dir: home.join(dir),
                    prompt_template: String::new(),
                    report_instruction: DEFAULT_REPORT_INSTRUCTION.to_string(),
                    timeout_secs: DEFAULT_AGENT_TIMEOUT_SECS,
                    capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                    available: false,
                },
            );
        }
    }

    /// Add or replace a single agent
    pub fn register(&self, config: AgentConfig) {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(config.name.clone(), config);
    }

    /// Probe PATH for every agent command and refresh availability
    pub fn detect_available_agents(&self) {
        self.detect_with(|cmd| which(cmd).is_some());
    }

    /// Refresh availability using a custom probe; safe to re-run
    pub fn detect_with<F>(&self, probe: F)
    where
        F: Fn(&str) -> bool,
    {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        for agent in agents.values_mut() {
            agent.available = probe(&agent.exec_cmd);
            debug!(
                agent = %agent.name,
                command = %agent.exec_cmd,
                available = agent.available,
                "Agent availability probe"
            );
        }
    }

    pub fn get_agent(&self, name: &str) -> Option<AgentConfig> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Agents whose command was found on the last probe, in catalog order
    pub fn get_available_agents(&self) -> Vec<AgentConfig> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|a| a.available)
            .cloned()
            .collect()
    }

    pub fn list_agents(&self) -> Vec<AgentConfig> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// First available agent, used when a submission names none
    pub fn default_agent(&self) -> Option<String> {
        self.get_available_agents().into_iter().next().map(|a| a.name)
    }
}

/// Resolve `program` to an executable path by walking PATH entries
fn which(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(program);
        return is_executable(&candidate).then_some(candidate);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_catalog() {
        let registry = AgentRegistry::with_default_agents(Path::new("/home/dev"));

        assert_eq!(registry.agent_names(), vec!["claude-code", "codex", "gemini"]);

        let claude = registry.get_agent("claude-code").unwrap();
        assert_eq!(claude.exec_cmd, "claude");
        assert_eq!(claude.config_dir, PathBuf::from("/home/dev/.claude"));
        assert_eq!(claude.timeout_secs, 420);
        assert!(claude.has_capability("review"));
        assert!(!claude.available);

        for agent in registry.list_agents() {
            assert!(agent.report_instruction.contains("<<<REPORT>>>"));
            assert!(agent.report_instruction.contains("<<<END_REPORT>>>"));
        }
        assert!(registry.get_agent("cursor").is_none());
    }

    #[test]
    fn test_detect_with_probe() {
        let registry = AgentRegistry::with_default_agents(Path::new("/home/dev"));
        assert!(registry.get_available_agents().is_empty());
        assert!(registry.default_agent().is_none());

        registry.detect_with(|cmd| cmd == "codex" || cmd == "gemini");
        let names: Vec<String> = registry
            .get_available_agents()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["codex", "gemini"]);
        assert_eq!(registry.default_agent().as_deref(), Some("codex"));

        // Re-running replaces the previous result
        registry.detect_with(|_| false);
        assert!(registry.get_available_agents().is_empty());
    }

    #[test]
    fn test_register_overrides() {
        let registry = AgentRegistry::with_default_agents(Path::new("/home/dev"));
        let mut custom = registry.get_agent("codex").unwrap();
        custom.timeout_secs = 60;
        registry.register(custom);
        assert_eq!(registry.get_agent("codex").unwrap().timeout_secs, 60);
        assert_eq!(registry.list_agents().len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_which_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let script = temp.path().join("fake-agent");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&script, perms.clone()).unwrap();
        assert!(which(script.to_str().unwrap()).is_none());

        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        assert_eq!(which(script.to_str().unwrap()), Some(script));
    }
}
