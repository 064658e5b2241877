//! Configuration management for Wave-Orch
//!
//! All on-disk state lives under one base directory (normally `~/.wave-orch`)
//! that is passed in explicitly; nothing in the core reads the home directory.
//!
//! ```text
//! <base>/config.toml
//! <base>/state/paused          pause marker
//! <base>/logs/YYYY-MM-DD/      daily event logs
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{OrchError, Result};

/// Name of the per-project orchestration directory (`<project>/.wave-orch`)
pub const PROJECT_DIR_NAME: &str = ".wave-orch";

/// Top-level Wave-Orch configuration, loaded from `<base>/config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchConfig {
    /// Root of all state and log trees; not part of the file
    #[serde(skip)]
    pub base_dir: PathBuf,

    /// Task engine limits
    #[serde(default)]
    pub engine: EngineSection,

    /// Project history settings
    #[serde(default)]
    pub projects: ProjectsSection,

    /// Event log settings
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Task engine limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Number of dispatch workers
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Bounded submission queue size
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retention cap on tracked tasks (0 = unlimited)
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// How long terminal tasks are kept, in seconds (0 = forever)
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,
}

/// Project history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsSection {
    /// Reports kept per project, newest win
    #[serde(default = "default_max_reports")]
    pub max_reports: usize,
}

/// Event log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Days of daily log directories to keep
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_max_parallel() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_tasks() -> usize {
    500
}

fn default_task_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_reports() -> usize {
    50
}

fn default_retention_days() -> i64 {
    7
}

impl OrchConfig {
    /// Defaults rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            engine: EngineSection::default(),
            projects: ProjectsSection::default(),
            logging: LoggingSection::default(),
        }
    }

    /// Load configuration from `<base>/config.toml` or use defaults
    pub fn load_or_default(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Self>(&content)
                .map_err(|e| OrchError::Config(format!("Failed to parse config file: {}", e)))?
        } else {
            Self::new(base_dir)
        };

        config.base_dir = base_dir.to_path_buf();
        if config.engine.max_parallel == 0 {
            config.engine.max_parallel = default_max_parallel();
        }
        if config.engine.queue_capacity == 0 {
            return Err(OrchError::Config(
                "engine.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Write default configuration to `<base>/config.toml`
    pub fn write_default(base_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(base_dir)?;

        let config_path = base_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::new(base_dir))
            .map_err(|e| OrchError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    /// Marker file whose existence means "paused"
    pub fn pause_flag_path(&self) -> PathBuf {
        self.state_dir().join("paused")
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.engine.task_ttl_secs)
    }

    /// Per-project orchestration directory
    pub fn project_dir(project_path: &Path) -> PathBuf {
        project_path.join(PROJECT_DIR_NAME)
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            queue_capacity: default_queue_capacity(),
            max_tasks: default_max_tasks(),
            task_ttl_secs: default_task_ttl_secs(),
        }
    }
}

impl Default for ProjectsSection {
    fn default() -> Self {
        Self {
            max_reports: default_max_reports(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let config = OrchConfig::load_or_default(temp.path()).unwrap();

        assert_eq!(config.base_dir, temp.path());
        assert_eq!(config.engine.max_parallel, 3);
        assert_eq!(config.engine.queue_capacity, 100);
        assert_eq!(config.engine.max_tasks, 500);
        assert_eq!(config.task_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.projects.max_reports, 50);
        assert_eq!(config.logging.retention_days, 7);
        assert_eq!(config.pause_flag_path(), temp.path().join("state").join("paused"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[engine]\nmax_parallel = 0\nmax_tasks = 10\n",
        )
        .unwrap();

        let config = OrchConfig::load_or_default(temp.path()).unwrap();
        // Zero workers falls back to the default pool size
        assert_eq!(config.engine.max_parallel, 3);
        assert_eq!(config.engine.max_tasks, 10);
        assert_eq!(config.engine.queue_capacity, 100);
        assert_eq!(config.projects.max_reports, 50);
    }

    #[test]
    fn test_write_default_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = OrchConfig::write_default(temp.path()).unwrap();
        assert!(path.exists());

        let config = OrchConfig::load_or_default(temp.path()).unwrap();
        assert_eq!(config.engine.task_ttl_secs, 86_400);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "engine = [").unwrap();

        let err = OrchConfig::load_or_default(temp.path()).unwrap_err();
        assert!(matches!(err, OrchError::Config(_)));
    }
}
