//! # waveorch-core
//!
//! Core types for the Wave-Orch multi-agent orchestration system.
//!
//! This crate provides:
//! - The task, report, agent and project data model
//! - The unified [`OrchError`] type
//! - Configuration loading ([`OrchConfig`])
//! - Secret/PII redaction applied to every piece of agent output before it is stored
//! - Fail-open helpers for infrastructure side effects

pub mod config;
mod error;
pub mod fail_open;
pub mod redact;
mod types;

pub use config::OrchConfig;
pub use error::{OrchError, Result, ValidationError};
pub use redact::{redact, redact_any, redact_map, redact_value, REDACTED};
pub use types::*;
