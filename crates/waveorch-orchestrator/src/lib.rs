//! # waveorch-orchestrator
//!
//! Multi-agent task orchestration engine for Wave-Orch.
//!
//! This crate provides:
//! - The task engine with a bounded queue, dispatch workers and retention sweeps
//! - The orchestration phase state machine
//! - The agent catalog and PATH-based availability probing
//! - The `<<<REPORT>>>` block protocol with strict validation
//! - Per-project round tracking with redacted snapshots
//! - A date-partitioned JSONL event log
//! - Agent and project configuration diagnostics

mod diagnostic;
mod dispatch;
mod engine;
mod executor;
mod logger;
mod pause;
mod registry;
mod report;
mod state_machine;
mod tracker;

pub use diagnostic::{AgentDiag, ConfigInspector, DiagnosticSnapshot, ProjectDiag};
pub use dispatch::{resolve_output, DispatchHooks, Outcome};
pub use engine::{by_completion_time, plan_cleanup, Engine, EngineConfig};
pub use executor::{AgentExecutor, MockAgentExecutor};
pub use logger::{LogEntry, LogLevel, Logger, DEFAULT_RETENTION_DAYS};
pub use pause::{FilePauseFlag, MemoryPauseFlag, PauseFlagStore};
pub use registry::{AgentRegistry, DEFAULT_AGENT_TIMEOUT_SECS, DEFAULT_REPORT_INSTRUCTION};
pub use report::{
    format_report_block, quick_status, validate_report, validate_report_strict, ReportParser,
    END_MARKER, START_MARKER,
};
pub use state_machine::{RunStatus, State, StateMachine};
pub use tracker::{detect_git_branch, redact_report, ProjectTracker, DEFAULT_MAX_REPORTS, STATE_FILE_NAME};
