//! Dispatch worker pool
//!
//! A fixed number of workers share the engine's queue receiver. Each worker
//! takes one task id at a time, marks the task running, hands the prompt to the
//! [`AgentExecutor`] and resolves the task from the report found in the output.
//! Every task a worker picks up ends `completed` or `failed`.

use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use waveorch_core::fail_open::fail_open;
use waveorch_core::{OrchError, Report, ReportStatus, Result, Task, TaskStatus};

use crate::engine::Engine;
use crate::executor::AgentExecutor;
use crate::logger::Logger;
use crate::report::{validate_report_strict, ReportParser};
use crate::tracker::ProjectTracker;

const LOG_COMPONENT: &str = "dispatch";

/// Optional collaborators notified as tasks resolve
#[derive(Clone, Default)]
pub struct DispatchHooks {
    pub tracker: Option<Arc<ProjectTracker>>,
    pub logger: Option<Arc<Logger>>,
}

impl DispatchHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(mut self, tracker: Arc<ProjectTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// How a finished agent run resolves its task
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: TaskStatus,
    pub report: Option<Report>,
}

impl Outcome {
    fn failed(report: Option<Report>) -> Self {
        Self {
            status: TaskStatus::Failed,
            report,
        }
    }
}

/// Map raw agent output to a task outcome
///
/// Missing, malformed or invalid reports fail the task without a report.
/// Valid reports complete it for SUCCESS/PARTIAL and fail it otherwise, with
/// the report attached either way.
pub fn resolve_output(parser: &ReportParser, output: &str) -> std::result::Result<Outcome, String> {
    let report = match parser.parse(output) {
        Ok(Some(report)) => report,
        Ok(None) => return Err("no report block in agent output".to_string()),
        Err(e) => return Err(e.to_string()),
    };

    if let Err(e) = validate_report_strict(Some(&report)) {
        return Err(e.to_string());
    }

    let status = match report.status_kind() {
        Some(ReportStatus::Success | ReportStatus::Partial) => TaskStatus::Completed,
        _ => TaskStatus::Failed,
    };
    Ok(Outcome {
        status,
        report: Some(report),
    })
}

impl Engine {
    /// Spawn the dispatch workers; only the first call succeeds
    pub fn start(
        self: &Arc<Self>,
        executor: Arc<dyn AgentExecutor>,
        hooks: DispatchHooks,
    ) -> Result<()> {
        let receiver = self
            .queue_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(OrchError::AlreadyStarted)?;

        let receiver = Arc::new(Mutex::new(receiver));
        let hooks = Arc::new(hooks);
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        for worker_id in 0..self.max_parallel {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(self),
                Arc::clone(&receiver),
                Arc::clone(&executor),
                Arc::clone(&hooks),
                self.shutdown_tx.subscribe(),
            )));
        }

        info!("Started {} dispatch workers", self.max_parallel);
        Ok(())
    }

    /// Stop the workers after their current task and wait for them
    ///
    /// Later submissions fail with `Shutdown`. Tasks still waiting in the
    /// queue are never picked up; they are resolved as `failed`.
    pub async fn shutdown(&self) {
        self.inner.write().await.shut_down = true;
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Dispatch worker ended abnormally: {}", e);
            }
        }

        let stranded: Vec<String> = self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();
        for id in &stranded {
            self.update_task_status(id, TaskStatus::Failed, None).await;
        }
        if !stranded.is_empty() {
            warn!("Failed {} queued tasks at shutdown", stranded.len());
        }
        info!("Engine shut down");
    }

    async fn dispatch(&self, task_id: &str, executor: &dyn AgentExecutor, hooks: &DispatchHooks) {
        let Some(task) = self.get_task(task_id).await else {
            debug!("Task {} vanished before dispatch", task_id);
            return;
        };

        self.update_task_status(task_id, TaskStatus::Running, None).await;
        let outcome = self.run_task(&task, executor, hooks).await;

        if let (Some(report), Some(tracker)) = (outcome.report.as_ref(), hooks.tracker.as_ref()) {
            tracker.register_project(&task.project_path).await;
            // Validated reports carry a positive round
            let round = u32::try_from(report.round).unwrap_or(task.round);
            tracker
                .update_round(&task.project_path, round, Some(report.clone()))
                .await;
            fail_open("tracker::save_to_file", || {
                tracker.save_to_file(&task.project_path)
            })
            .await;
        }

        info!("Task {} resolved as {}", task_id, outcome.status);
        if let Some(logger) = hooks.logger.as_ref() {
            let message = format!("task {} {}", task_id, outcome.status);
            fail_open("logger::info", || logger.info(LOG_COMPONENT, &message)).await;
        }

        self.update_task_status(task_id, outcome.status, outcome.report)
            .await;
    }

    async fn run_task(
        &self,
        task: &Task,
        executor: &dyn AgentExecutor,
        hooks: &DispatchHooks,
    ) -> Outcome {
        let Some(agent) = self.registry().get_agent(&task.agent) else {
            let err = OrchError::AgentNotFound(task.agent.clone());
            warn!("Task {}: {}", task.id, err);
            log_failure(hooks, &task.id, err.to_string()).await;
            return Outcome::failed(None);
        };

        let prompt = agent.build_prompt(&task.prompt);
        debug!("Task {} -> agent {} ({} byte prompt)", task.id, agent.name, prompt.len());

        let output = match executor.execute(&agent, &prompt).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Task {}: agent {} failed: {}", task.id, agent.name, e);
                log_failure(hooks, &task.id, e.to_string()).await;
                return Outcome::failed(None);
            }
        };

        match resolve_output(&ReportParser::new(), &output) {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!("Task {}: unusable report: {}", task.id, reason);
                log_failure(hooks, &task.id, reason).await;
                Outcome::failed(None)
            }
        }
    }
}

async fn log_failure(hooks: &DispatchHooks, task_id: &str, reason: String) {
    if let Some(logger) = hooks.logger.as_ref() {
        let message = format!("task {} failed", task_id);
        fail_open("logger::error", || logger.error(LOG_COMPONENT, &message, reason)).await;
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: Arc<Engine>,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    executor: Arc<dyn AgentExecutor>,
    hooks: Arc<DispatchHooks>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Dispatch worker {} started", worker_id);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                // A dropped sender also means stop
                _ = shutdown.changed() => None,
                task_id = receiver.recv() => task_id,
            }
        };

        let Some(task_id) = next else {
            break;
        };
        engine.dispatch(&task_id, executor.as_ref(), &hooks).await;
    }

    debug!("Dispatch worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::executor::MockAgentExecutor;
    use crate::pause::MemoryPauseFlag;
    use crate::registry::AgentRegistry;
    use std::path::Path;
    use std::time::Duration;

    fn block(status: &str) -> String {
        format!(
            "thinking...\n<<<REPORT>>>\n{{\"project_id\":\"app\",\"agent\":\"codex\",\"round\":1,\
             \"status\":\"{}\",\"summary\":\"did it\",\"files_changed\":[],\"commands_run\":[]}}\n\
             <<<END_REPORT>>>\n",
            status
        )
    }

    fn engine() -> Arc<Engine> {
        let registry = AgentRegistry::with_default_agents(Path::new("/home/test"));
        registry.detect_with(|_| true);
        Arc::new(Engine::new(
            EngineConfig::default().with_max_parallel(2),
            Arc::new(registry),
            Arc::new(MemoryPauseFlag::default()),
        ))
    }

    async fn wait_terminal(engine: &Engine, id: &str) -> Task {
        for _ in 0..200 {
            if let Some(task) = engine.get_task(id).await {
                if task.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", id);
    }

    #[test]
    fn test_resolve_output_mapping() {
        let parser = ReportParser::new();

        for (status, expected) in [
            ("SUCCESS", TaskStatus::Completed),
            ("PARTIAL", TaskStatus::Completed),
            ("FAIL", TaskStatus::Failed),
            ("BLOCKED", TaskStatus::Failed),
        ] {
            let outcome = resolve_output(&parser, &block(status)).unwrap();
            assert_eq!(outcome.status, expected, "status {}", status);
            assert_eq!(outcome.report.unwrap().status, status);
        }

        assert!(resolve_output(&parser, "no block at all").is_err());
        assert!(resolve_output(&parser, "<<<REPORT>>>{oops<<<END_REPORT>>>").is_err());

        let invalid = resolve_output(&parser, &block("DONE")).unwrap_err();
        assert!(invalid.contains("status"));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let engine = engine();
        let executor: Arc<dyn AgentExecutor> = Arc::new(MockAgentExecutor::new());

        engine.start(executor.clone(), DispatchHooks::new()).unwrap();
        assert!(matches!(
            engine.start(executor, DispatchHooks::new()),
            Err(OrchError::AlreadyStarted)
        ));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_resolves_tasks() {
        let engine = engine();
        let executor = MockAgentExecutor::new()
            .with_response("codex", block("SUCCESS"))
            .with_response("gemini", "I forgot the report")
            .with_failure("claude-code", "timed out after 420s");
        engine
            .start(Arc::new(executor.clone()), DispatchHooks::new())
            .unwrap();

        let ok = engine.submit_task("/work/app", "add tests", "codex").await.unwrap();
        let missing = engine.submit_task("/work/app", "add docs", "gemini").await.unwrap();
        let crashed = engine.submit_task("/work/app", "refactor", "claude-code").await.unwrap();
        let unknown = engine.submit_task("/work/app", "x", "cursor").await.unwrap();

        let ok = wait_terminal(&engine, &ok.id).await;
        assert_eq!(ok.status, TaskStatus::Completed);
        assert!(ok.started_at.is_some());
        assert_eq!(ok.report.as_ref().unwrap().summary, "did it");

        for id in [&missing.id, &crashed.id, &unknown.id] {
            let task = wait_terminal(&engine, id).await;
            assert_eq!(task.status, TaskStatus::Failed);
            assert!(task.report.is_none());
        }

        // Prompts carry the report contract
        let prompts = executor.prompts();
        assert!(prompts
            .iter()
            .any(|(agent, prompt)| agent == "codex" && prompt.contains("<<<REPORT>>>")));

        engine.shutdown().await;
        assert!(matches!(
            engine.submit_task("/work/app", "late", "codex").await,
            Err(OrchError::Shutdown)
        ));
    }
    #[tokio::test]
    async fn test_shutdown_fails_queued_tasks() {
        // Never started, so nothing drains the queue
        let engine = engine();
        let mut ids = Vec::new();
        for i in 0..3 {
            let task = engine
                .submit_task("/work/app", format!("job {}", i), "codex")
                .await
                .unwrap();
            ids.push(task.id);
        }

        engine.shutdown().await;

        for id in &ids {
            let task = engine.get_task(id).await.unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
            assert!(task.completed_at.is_some());
        }
    }
}
