//! Task engine: task table, bounded submission queue and retention
//!
//! Submissions are recorded in the task table and their ids pushed onto a
//! bounded queue that the dispatch workers drain.
//! Every table mutation goes through one reader/writer lock, and the queue is
//! only ever written while that lock is held so a rejected enqueue can roll
//! its bookkeeping back atomically.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use waveorch_core::fail_open::fail_open_sync;
use waveorch_core::{OrchConfig, OrchError, Report, Result, Task, TaskStatus};

use crate::pause::PauseFlagStore;
use crate::registry::AgentRegistry;
use crate::state_machine::{State, StateMachine};

/// Engine sizing and retention policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Dispatch worker count
    pub max_parallel: usize,
    /// Submission queue bound
    pub queue_capacity: usize,
    /// Retention cap (0 = unlimited)
    pub max_tasks: usize,
    /// Age after which terminal tasks are swept (zero = never)
    pub task_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&OrchConfig::new(PathBuf::new()))
    }
}

impl From<&OrchConfig> for EngineConfig {
    fn from(config: &OrchConfig) -> Self {
        Self {
            max_parallel: config.engine.max_parallel,
            queue_capacity: config.engine.queue_capacity,
            max_tasks: config.engine.max_tasks,
            task_ttl: config.task_ttl(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n;
        self
    }

    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }
}

#[derive(Debug)]
pub(crate) struct EngineInner {
    pub(crate) tasks: HashMap<String, Task>,
    paused: bool,
    pub(crate) shut_down: bool,
    max_tasks: usize,
    task_ttl: Duration,
    next_seq: u64,
}

/// Multi-agent task engine
pub struct Engine {
    pub(crate) inner: RwLock<EngineInner>,
    queue_tx: mpsc::Sender<String>,
    pub(crate) queue_rx: Mutex<Option<mpsc::Receiver<String>>>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) workers: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) max_parallel: usize,
    instance_prefix: String,
    state_machine: Arc<StateMachine>,
    registry: Arc<AgentRegistry>,
    pause_flag: Arc<dyn PauseFlagStore>,
}

impl Engine {
    /// Build an engine; the initial pause state is read from `pause_flag`
    pub fn new(
        config: EngineConfig,
        registry: Arc<AgentRegistry>,
        pause_flag: Arc<dyn PauseFlagStore>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let paused = pause_flag.is_paused();
        let instance_prefix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

        let state_machine = Arc::new(StateMachine::new());
        if paused {
            // IDLE -> PAUSED is always allowed
            let _ = state_machine.transition(State::Paused);
        }

        debug!(
            "Engine {} created (workers: {}, queue: {}, paused: {})",
            instance_prefix, config.max_parallel, config.queue_capacity, paused
        );

        Self {
            inner: RwLock::new(EngineInner {
                tasks: HashMap::new(),
                paused,
                shut_down: false,
                max_tasks: config.max_tasks,
                task_ttl: config.task_ttl,
                next_seq: 0,
            }),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
            max_parallel: config.max_parallel.max(1),
            instance_prefix,
            state_machine,
            registry,
            pause_flag,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn state_machine(&self) -> &Arc<StateMachine> {
        &self.state_machine
    }

    /// Current orchestration state
    pub fn state(&self) -> State {
        self.state_machine.current_state()
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.read().await.paused
    }

    /// Record a task and enqueue it for dispatch
    ///
    /// An empty `preferred_agent` is replaced by the first available agent.
    pub async fn submit_task(
        &self,
        project_path: impl Into<PathBuf>,
        prompt: impl Into<String>,
        preferred_agent: &str,
    ) -> Result<Task> {
        let agent = if preferred_agent.is_empty() {
            self.registry.default_agent().unwrap_or_default()
        } else {
            preferred_agent.to_string()
        };

        let mut inner = self.inner.write().await;
        if inner.shut_down {
            return Err(OrchError::Shutdown);
        }
        if inner.paused {
            debug!("Rejected submission: engine paused");
            return Err(OrchError::Paused);
        }

        inner.next_seq += 1;
        let id = format!("task-{}-{}", self.instance_prefix, inner.next_seq);
        let task = Task::new(id.clone(), project_path, prompt, agent);
        inner.tasks.insert(id.clone(), task.clone());

        match self.queue_tx.try_send(id.clone()) {
            Ok(()) => {
                info!("Submitted task {} for agent '{}'", id, task.agent);
                Ok(task)
            }
            Err(TrySendError::Full(_)) => {
                inner.tasks.remove(&id);
                warn!("Rejected task {}: queue full", id);
                Err(OrchError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                inner.tasks.remove(&id);
                Err(OrchError::Shutdown)
            }
        }
    }

    /// Stop accepting submissions; in-flight work is unaffected
    pub async fn pause(&self) {
        {
            // Flag and phase change together under the table lock
            let mut inner = self.inner.write().await;
            inner.paused = true;
            if let Err(e) = self.state_machine.transition(State::Paused) {
                debug!("Pause left orchestration state unchanged: {}", e);
            }
        }
        fail_open_sync("pause_flag::set", || self.pause_flag.set_paused(true));
        info!("Engine paused");
    }

    pub async fn resume(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.paused = false;
            if let Err(e) = self.state_machine.transition(State::Idle) {
                debug!("Resume left orchestration state unchanged: {}", e);
            }
        }
        fail_open_sync("pause_flag::clear", || self.pause_flag.set_paused(false));
        info!("Engine resumed");
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    /// Snapshot of every tracked task, in no particular order
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.inner.read().await.tasks.values().cloned().collect()
    }

    /// Move a task to `status`, attaching `report` if given; unknown ids are ignored
    pub async fn update_task_status(&self, id: &str, status: TaskStatus, report: Option<Report>) {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(id) else {
            debug!("Ignoring status update for unknown task {}", id);
            return;
        };

        let now = Utc::now();
        task.status = status;
        match status {
            TaskStatus::Running => {
                task.started_at = Some(now);
                task.completed_at = None;
            }
            TaskStatus::Completed | TaskStatus::Failed => task.completed_at = Some(now),
            TaskStatus::Pending => task.completed_at = None,
        }
        if report.is_some() {
            task.report = report;
        }
        debug!("Task {} -> {}", id, status);
    }

    /// Retention policy applied by the next sweep
    pub async fn set_cleanup_policy(&self, max_tasks: usize, ttl: Duration) {
        let mut inner = self.inner.write().await;
        inner.max_tasks = max_tasks;
        inner.task_ttl = ttl;
    }

    /// Run one retention sweep, returning how many tasks were removed
    pub async fn cleanup_tasks(&self) -> usize {
        self.cleanup_tasks_at(Utc::now()).await
    }

    pub async fn cleanup_tasks_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let doomed = plan_cleanup(&inner.tasks, inner.max_tasks, inner.task_ttl, now);
        for id in &doomed {
            inner.tasks.remove(id);
        }
        if !doomed.is_empty() {
            info!(
                "Retention sweep removed {} tasks ({} remain)",
                doomed.len(),
                inner.tasks.len()
            );
        }
        doomed.len()
    }
}

/// Ids a retention sweep would remove
///
/// Phase 1 drops terminal tasks completed more than `ttl` ago (zero disables
/// it). Phase 2 drops the earliest-completed remaining terminal tasks until at
/// most `max_tasks` are left (zero disables it). Pending and running tasks are
/// never chosen.
pub fn plan_cleanup(
    tasks: &HashMap<String, Task>,
    max_tasks: usize,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    let ttl = (!ttl.is_zero())
        .then(|| chrono::Duration::from_std(ttl).ok())
        .flatten();

    let (expired, mut survivors): (Vec<&Task>, Vec<&Task>) = tasks
        .values()
        .filter(|t| t.is_terminal())
        .partition(|t| match (ttl, t.completed_at) {
            (Some(ttl), Some(done)) => now - done > ttl,
            _ => false,
        });

    let mut doomed: Vec<String> = expired.iter().map(|t| t.id.clone()).collect();

    let remaining = tasks.len() - doomed.len();
    if max_tasks > 0 && remaining > max_tasks {
        survivors.sort_by(|a, b| by_completion_time(a, b));
        let excess = remaining - max_tasks;
        doomed.extend(survivors.iter().take(excess).map(|t| t.id.clone()));
    }

    doomed
}

/// Earliest completion first; ids break ties
pub fn by_completion_time(a: &Task, b: &Task) -> Ordering {
    a.completed_at
        .cmp(&b.completed_at)
        .then_with(|| a.id.cmp(&b.id))
}
