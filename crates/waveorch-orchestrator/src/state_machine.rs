//! Orchestration phase state machine
//!
//! Tracks the macro phase of a multi-round run (planning, executing, collecting,
//! deciding) against a fixed transition table:
//!
//! ```text
//! IDLE       -> PLANNING | PAUSED
//! PLANNING   -> EXECUTING | PAUSED | ERROR
//! EXECUTING  -> COLLECTING | PAUSED | ERROR
//! COLLECTING -> DECIDING | PAUSED | ERROR
//! DECIDING   -> EXECUTING | COMPLETED | BLOCKED | PAUSED | ERROR
//! PAUSED     -> IDLE | PLANNING | EXECUTING | COLLECTING | DECIDING
//! BLOCKED    -> DECIDING | PAUSED
//! COMPLETED, ERROR -> (nothing)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use waveorch_core::{OrchError, Result};

/// Orchestration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Idle,
    Planning,
    Executing,
    Collecting,
    Deciding,
    Completed,
    Paused,
    Error,
    Blocked,
}

impl State {
    pub const ALL: [State; 9] = [
        Self::Idle,
        Self::Planning,
        Self::Executing,
        Self::Collecting,
        Self::Deciding,
        Self::Completed,
        Self::Paused,
        Self::Error,
        Self::Blocked,
    ];

    /// Targets reachable from this state in one step
    pub fn allowed_targets(self) -> &'static [State] {
        use State::*;
        match self {
            Idle => &[Planning, Paused],
            Planning => &[Executing, Paused, Error],
            Executing => &[Collecting, Paused, Error],
            Collecting => &[Deciding, Paused, Error],
            Deciding => &[Executing, Completed, Blocked, Paused, Error],
            Paused => &[Idle, Planning, Executing, Collecting, Deciding],
            Blocked => &[Deciding, Paused],
            Completed | Error => &[],
        }
    }

    pub fn can_transition_to(self, target: State) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Planning => "PLANNING",
            Self::Executing => "EXECUTING",
            Self::Collecting => "COLLECTING",
            Self::Deciding => "DECIDING",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Error => "ERROR",
            Self::Blocked => "BLOCKED",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid orchestration state: {}", s))
    }
}

/// Status record mirrored by the state machine on every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub task_id: String,
    pub project_path: PathBuf,
    pub state: State,
    pub round: u32,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(task_id: impl Into<String>, project_path: impl Into<PathBuf>, round: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            project_path: project_path.into(),
            state: State::Idle,
            round,
            start_time: now,
            last_update: now,
            error: None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    current: State,
    status: Option<RunStatus>,
}

impl Inner {
    fn apply(&mut self, target: State) -> Result<()> {
        let from = self.current;
        if !from.can_transition_to(target) {
            return Err(OrchError::InvalidTransition {
                from: from.to_string(),
                to: target.to_string(),
            });
        }

        self.current = target;
        if let Some(status) = self.status.as_mut() {
            status.state = target;
            status.last_update = Utc::now();
        }
        debug!("Orchestration state {} -> {}", from, target);
        Ok(())
    }
}

/// Thread-safe orchestration state machine
#[derive(Debug)]
pub struct StateMachine {
    inner: RwLock<Inner>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                current: State::Idle,
                status: None,
            }),
        }
    }

    pub fn current_state(&self) -> State {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).current
    }

    /// Check a transition without performing it
    pub fn can_transition(&self, target: State) -> bool {
        self.current_state().can_transition_to(target)
    }

    /// Move to `target`, updating the attached run status if any
    pub fn transition(&self, target: State) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.apply(target)
    }

    /// Transition to ERROR and record the reason on the run status
    pub fn fail(&self, error: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.apply(State::Error)?;
        if let Some(status) = inner.status.as_mut() {
            status.error = Some(error.into());
        }
        Ok(())
    }

    /// Attach a run status; its state is synced to the current state
    pub fn attach_status(&self, mut status: RunStatus) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        status.state = inner.current;
        inner.status = Some(status);
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
            .clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let sm = StateMachine::new();
        assert_eq!(sm.current_state(), State::Idle);
        assert!(sm.status().is_none());
    }

    #[test]
    fn test_idle_to_planning() {
        let sm = StateMachine::new();
        sm.transition(State::Planning).unwrap();
        assert_eq!(sm.current_state(), State::Planning);
    }

    #[test]
    fn test_idle_to_completed_rejected() {
        let sm = StateMachine::new();
        let err = sm.transition(State::Completed).unwrap_err();
        assert!(matches!(
            err,
            OrchError::InvalidTransition { ref from, ref to } if from == "IDLE" && to == "COMPLETED"
        ));
        assert_eq!(sm.current_state(), State::Idle);
    }

    #[test]
    fn test_planning_to_completed_rejected() {
        let sm = StateMachine::new();
        sm.transition(State::Planning).unwrap();
        assert!(sm.transition(State::Completed).is_err());
    }

    #[test]
    fn test_full_round_flow() {
        let sm = StateMachine::new();
        for target in [
            State::Planning,
            State::Executing,
            State::Collecting,
            State::Deciding,
            State::Executing,
            State::Collecting,
            State::Deciding,
            State::Completed,
        ] {
            sm.transition(target).unwrap();
        }
        assert_eq!(sm.current_state(), State::Completed);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [State::Completed, State::Error] {
            assert!(terminal.allowed_targets().is_empty());
            for target in State::ALL {
                assert!(!terminal.can_transition_to(target));
            }
        }

        let sm = StateMachine::new();
        sm.transition(State::Planning).unwrap();
        sm.transition(State::Error).unwrap();
        assert!(sm.transition(State::Idle).is_err());
        assert!(sm.transition(State::Paused).is_err());
    }

    #[test]
    fn test_pause_and_resume_into_any_phase() {
        let sm = StateMachine::new();
        sm.transition(State::Planning).unwrap();
        sm.transition(State::Paused).unwrap();
        assert!(sm.can_transition(State::Deciding));
        assert!(!sm.can_transition(State::Completed));
        sm.transition(State::Executing).unwrap();
        assert_eq!(sm.current_state(), State::Executing);
    }

    #[test]
    fn test_blocked_returns_to_deciding() {
        let sm = StateMachine::new();
        for target in [
            State::Planning,
            State::Executing,
            State::Collecting,
            State::Deciding,
            State::Blocked,
        ] {
            sm.transition(target).unwrap();
        }
        assert!(!sm.can_transition(State::Executing));
        sm.transition(State::Deciding).unwrap();
    }

    #[test]
    fn test_can_transition_does_not_mutate() {
        let sm = StateMachine::new();
        assert!(sm.can_transition(State::Planning));
        assert!(!sm.can_transition(State::Collecting));
        assert_eq!(sm.current_state(), State::Idle);
    }

    #[test]
    fn test_attached_status_tracks_transitions() {
        let sm = StateMachine::new();
        sm.attach_status(RunStatus::new("task-1", "/work/app", 1));

        let before = sm.status().unwrap();
        assert_eq!(before.state, State::Idle);

        sm.transition(State::Planning).unwrap();
        let after = sm.status().unwrap();
        assert_eq!(after.state, State::Planning);
        assert!(after.last_update >= before.last_update);

        // Rejected transitions leave the record alone
        assert!(sm.transition(State::Completed).is_err());
        assert_eq!(sm.status().unwrap().state, State::Planning);
    }

    #[test]
    fn test_fail_records_error() {
        let sm = StateMachine::new();
        sm.attach_status(RunStatus::new("task-1", "/work/app", 2));
        sm.transition(State::Planning).unwrap();
        sm.fail("agent crashed").unwrap();

        let status = sm.status().unwrap();
        assert_eq!(status.state, State::Error);
        assert_eq!(status.error.as_deref(), Some("agent crashed"));
    }

    #[test]
    fn test_state_parse_and_display() {
        for state in State::ALL {
            assert_eq!(state.to_string().parse::<State>().unwrap(), state);
        }
        assert_eq!("paused".parse::<State>().unwrap(), State::Paused);
        assert!("RUNNING".parse::<State>().is_err());
    }
}
