//! Agent loop controller: bounded observe-decide-act orchestration.
//!
//! A run first offers the task to the direct-resolution shortcut (when one
//! is configured), then iterates: capture the environment, ask the decision
//! provider for the next action, apply it, and feed the outcome back. The
//! loop terminates on completion, stagnation, an unrecoverable error, the
//! iteration budget, or cancellation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskrelay_core_types::SessionId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::AgentLoopConfig;
use super::stagnation::{StagnationDetector, StagnationKey};
use super::types::{Action, ActionKind, Decision, ExecutionOutcome, IterationRecord};
use crate::errors::{DecisionError, ExecutionError, PerceptionError};
use crate::model::{DirectTarget, Task};
use crate::ports::{ActionExecutor, DecisionProvider, DirectResolver, Perceiver, Verifier, WebLookup};
use crate::shortcut::{first_url, DirectShortcut, ShortcutOutcome};

/// Characters of lookup text kept in a `search_web` outcome.
const SEARCH_SNIPPET_CHARS: usize = 100;

/// Result of one task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopResult {
    /// Terminal status of the run.
    pub status: AgentLoopStatus,
    /// Completion or error message.
    pub message: String,
    /// Loop iterations performed. Zero when the shortcut finished the task.
    pub iterations: u32,
    /// Actions handed to the executor, shortcut navigation included.
    pub executor_calls: u32,
    /// One record per iteration that reached a decision.
    pub history: Vec<IterationRecord>,
    /// Target found by the direct-resolution shortcut, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_target: Option<DirectTarget>,
    /// Total execution time in milliseconds.
    pub total_time_ms: u64,
}

impl AgentLoopResult {
    /// Result for a task completed by direct navigation.
    pub fn direct(target: DirectTarget, detail: String, time_ms: u64) -> Self {
        Self {
            status: AgentLoopStatus::Completed,
            message: if detail.is_empty() {
                format!("Opened {}", target.url)
            } else {
                detail
            },
            iterations: 0,
            executor_calls: 1,
            history: Vec::new(),
            direct_target: Some(target),
            total_time_ms: time_ms,
        }
    }

    /// Result for a request rejected before any collaborator was called.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: AgentLoopStatus::Failed,
            message: message.into(),
            iterations: 0,
            executor_calls: 0,
            history: Vec::new(),
            direct_target: None,
            total_time_ms: 0,
        }
    }

    /// Check if the loop completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self.status, AgentLoopStatus::Completed)
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLoopStatus {
    /// The task was satisfied.
    Completed,
    /// The same action kept coming back.
    Stuck,
    /// A collaborator failed, or the provider gave up.
    Failed,
    /// The iteration budget ran out.
    Aborted,
    /// The run was cancelled from outside.
    Cancelled,
}

impl AgentLoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stuck => "stuck",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AgentLoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run state. Never shared between runs.
struct LoopState {
    started: Instant,
    iterations: u32,
    executor_calls: u32,
    consecutive_decision_failures: u32,
    consecutive_verifies: u32,
    history: Vec<IterationRecord>,
    last_outcome: Option<ExecutionOutcome>,
    stagnation: StagnationDetector,
    direct_target: Option<DirectTarget>,
}

impl LoopState {
    fn new(config: &AgentLoopConfig) -> Self {
        Self {
            started: Instant::now(),
            iterations: 0,
            executor_calls: 0,
            consecutive_decision_failures: 0,
            consecutive_verifies: 0,
            history: Vec::new(),
            last_outcome: None,
            stagnation: StagnationDetector::new(config.stagnation_window),
            direct_target: None,
        }
    }

    fn context(&self, lines: usize) -> Vec<String> {
        let skip = self.history.len().saturating_sub(lines);
        self.history[skip..]
            .iter()
            .map(IterationRecord::context_line)
            .collect()
    }

    fn record(&mut self, action: Option<Action>, outcome: ExecutionOutcome, signature: Option<String>) {
        self.history.push(IterationRecord {
            index: self.iterations,
            action,
            outcome: outcome.clone(),
            signature,
            recorded_at: Utc::now(),
        });
        self.last_outcome = Some(outcome);
    }

    fn finish(self, status: AgentLoopStatus, message: impl Into<String>) -> AgentLoopResult {
        AgentLoopResult {
            status,
            message: message.into(),
            iterations: self.iterations,
            executor_calls: self.executor_calls,
            history: self.history,
            direct_target: self.direct_target,
            total_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Outcome of a collaborator call raced against its timeout and the
/// run's cancellation token.
enum Bounded<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

async fn bounded<F: Future>(
    cancel: &CancellationToken,
    limit: Duration,
    call: F,
) -> Bounded<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        res = tokio::time::timeout(limit, call) => match res {
            Ok(value) => Bounded::Ready(value),
            Err(_) => Bounded::TimedOut,
        },
    }
}

/// What applying one decided action produced.
enum Applied {
    Outcome(ExecutionOutcome),
    /// A `verify` action got the expected answer.
    Verified(String),
    Cancelled,
}

/// Drives tasks through the observe-decide-act loop.
///
/// Holds only configuration and collaborators, so one controller behind an
/// `Arc` can serve any number of concurrent runs.
pub struct AgentLoopController {
    config: AgentLoopConfig,
    perceiver: Arc<dyn Perceiver>,
    decider: Arc<dyn DecisionProvider>,
    executor: Arc<dyn ActionExecutor>,
    shortcut: Option<DirectShortcut>,
    lookup: Option<Arc<dyn WebLookup>>,
    verifier: Option<Arc<dyn Verifier>>,
}

impl AgentLoopController {
    pub fn new(
        config: AgentLoopConfig,
        perceiver: Arc<dyn Perceiver>,
        decider: Arc<dyn DecisionProvider>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            config,
            perceiver,
            decider,
            executor,
            shortcut: None,
            lookup: None,
            verifier: None,
        }
    }

    /// Web lookup used by `search_web` actions.
    pub fn with_lookup(mut self, lookup: Arc<dyn WebLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Verifier used by `verify` actions.
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Enable the direct-resolution shortcut with the given resolver.
    pub fn with_shortcut(mut self, resolver: Arc<dyn DirectResolver>) -> Self {
        self.shortcut = Some(DirectShortcut::new(
            resolver,
            Arc::clone(&self.executor),
            self.config.action_timeout_ms,
        ));
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    /// Run one task to a terminal status.
    pub async fn run(
        &self,
        session: &SessionId,
        mut task: Task,
        cancel: &CancellationToken,
    ) -> AgentLoopResult {
        let mut state = LoopState::new(&self.config);
        info!(task_id = %task.id, session = %session, "agent run started");

        if cancel.is_cancelled() {
            return state.finish(AgentLoopStatus::Cancelled, "Run cancelled before start");
        }

        if self.config.enable_shortcut {
            if let Some(shortcut) = &self.shortcut {
                match shortcut.attempt(session, &mut task).await {
                    ShortcutOutcome::Completed { target, detail } => {
                        info!(task_id = %task.id, url = %target.url, "task completed by direct navigation");
                        return AgentLoopResult::direct(
                            target,
                            detail,
                            state.started.elapsed().as_millis() as u64,
                        );
                    }
                    ShortcutOutcome::FallThrough { target, reason } => {
                        debug!(task_id = %task.id, %reason, "shortcut fell through");
                        if let Some(target) = target {
                            state.executor_calls += 1;
                            state.direct_target = Some(target);
                        }
                    }
                }
            }
        }

        let result = self.iterate(session, &task, cancel, state).await;
        info!(
            task_id = %task.id,
            status = %result.status,
            iterations = result.iterations,
            executor_calls = result.executor_calls,
            "agent run finished"
        );
        result
    }

    async fn iterate(
        &self,
        session: &SessionId,
        task: &Task,
        cancel: &CancellationToken,
        mut state: LoopState,
    ) -> AgentLoopResult {
        let perception_timeout = Duration::from_millis(self.config.perception_timeout_ms);
        let decision_timeout = Duration::from_millis(self.config.decision_timeout_ms);

        loop {
            if cancel.is_cancelled() {
                return state.finish(AgentLoopStatus::Cancelled, "Run cancelled");
            }
            state.iterations += 1;
            let iteration = state.iterations;

            // Observe
            let captured = match bounded(cancel, perception_timeout, self.perceiver.capture(session)).await {
                Bounded::Ready(result) => result,
                Bounded::TimedOut => Err(PerceptionError::Timeout(self.config.perception_timeout_ms)),
                Bounded::Cancelled => {
                    return state.finish(AgentLoopStatus::Cancelled, "Run cancelled");
                }
            };
            let mut observation = match captured {
                Ok(observation) => observation,
                Err(err) => {
                    warn!(task_id = %task.id, iteration, error = %err, "perception failed");
                    return state.finish(AgentLoopStatus::Failed, format!("Perception failed: {err}"));
                }
            };
            observation.sequence = iteration;
            observation.feedback = state.last_outcome.clone();
            observation.context = state.context(self.config.context_lines);

            // Decide
            let decided = match bounded(cancel, decision_timeout, self.decider.decide(&observation, task)).await {
                Bounded::Ready(result) => result,
                Bounded::TimedOut => Err(DecisionError::Timeout(self.config.decision_timeout_ms)),
                Bounded::Cancelled => {
                    return state.finish(AgentLoopStatus::Cancelled, "Run cancelled");
                }
            };

            let (action, raw) = match decided {
                Ok(Decision::Act { action, raw }) => {
                    state.consecutive_decision_failures = 0;
                    (action, raw)
                }
                Ok(Decision::Done { message }) => {
                    info!(task_id = %task.id, iteration, "decision provider reports task done");
                    return state.finish(AgentLoopStatus::Completed, message);
                }
                Ok(Decision::GiveUp { reason }) => {
                    warn!(task_id = %task.id, iteration, %reason, "decision provider gave up");
                    return state.finish(AgentLoopStatus::Failed, reason);
                }
                Err(err) if err.is_recoverable() => {
                    state.consecutive_decision_failures += 1;
                    let failures = state.consecutive_decision_failures;
                    warn!(
                        task_id = %task.id,
                        iteration,
                        error = %err,
                        consecutive = failures,
                        "decision unusable, asking again"
                    );
                    state.record(None, ExecutionOutcome::failure(err.to_string()), None);
                    state.stagnation.reset();
                    state.consecutive_verifies = 0;
                    if failures >= self.config.max_consecutive_decision_failures {
                        return state.finish(
                            AgentLoopStatus::Failed,
                            format!("Decision provider failed {failures} times in a row: {err}"),
                        );
                    }
                    if iteration >= self.config.max_iterations {
                        return self.budget_exhausted(state);
                    }
                    continue;
                }
                Err(err) => {
                    warn!(task_id = %task.id, iteration, error = %err, "decision failed");
                    return state.finish(AgentLoopStatus::Failed, format!("Decision failed: {err}"));
                }
            };

            // Act
            let signature = action.signature();
            if matches!(action.kind, ActionKind::Verify { .. }) {
                state.consecutive_verifies += 1;
                let verifies = state.consecutive_verifies;
                if verifies > self.config.max_consecutive_verifies {
                    warn!(task_id = %task.id, iteration, verifies, "verification keeps repeating");
                    let message = format!(
                        "Verification requested {verifies} times in a row; assuming the task is complete"
                    );
                    state.record(Some(action), ExecutionOutcome::success(message.clone()), Some(signature));
                    return state.finish(AgentLoopStatus::Completed, message);
                }
            } else {
                state.consecutive_verifies = 0;
            }

            debug!(task_id = %task.id, iteration, %signature, "applying action");
            let outcome = match self.apply(session, &action, &mut state, cancel).await {
                Applied::Outcome(outcome) => outcome,
                Applied::Verified(message) => {
                    info!(task_id = %task.id, iteration, %message, "verification passed");
                    state.record(Some(action), ExecutionOutcome::success(message.clone()), Some(signature));
                    return state.finish(AgentLoopStatus::Completed, message);
                }
                Applied::Cancelled => {
                    return state.finish(AgentLoopStatus::Cancelled, "Run cancelled");
                }
            };
            if let ExecutionOutcome::Failure { reason } = &outcome {
                warn!(task_id = %task.id, iteration, %signature, %reason, "action failed");
            }

            let key = match (self.config.stagnation_key, raw) {
                (StagnationKey::Raw, Some(raw)) => raw.trim().to_string(),
                _ => signature.clone(),
            };
            let stuck = state.stagnation.observe(key);
            state.record(Some(action), outcome, Some(signature.clone()));

            if stuck {
                warn!(task_id = %task.id, iteration, %signature, "loop is stuck");
                let window = state.stagnation.capacity();
                return state.finish(
                    AgentLoopStatus::Stuck,
                    format!("Stuck: the same action `{signature}` was chosen {window} times in a row"),
                );
            }
            if iteration >= self.config.max_iterations {
                return self.budget_exhausted(state);
            }
        }
    }

    async fn apply(
        &self,
        session: &SessionId,
        action: &Action,
        state: &mut LoopState,
        cancel: &CancellationToken,
    ) -> Applied {
        match &action.kind {
            ActionKind::SearchWeb { query } => self.search_web(session, query, state, cancel).await,
            ActionKind::Verify { question, expected } => {
                self.verify(session, question, expected, cancel).await
            }
            _ => {
                state.executor_calls += 1;
                Applied::Outcome(self.execute(session, action).await)
            }
        }
    }

    async fn execute(&self, session: &SessionId, action: &Action) -> ExecutionOutcome {
        let limit = Duration::from_millis(self.config.action_timeout_ms);
        match tokio::time::timeout(limit, self.executor.execute(session, action)).await {
            Ok(outcome) => outcome,
            Err(_) => ExecutionError::Timeout(self.config.action_timeout_ms).into(),
        }
    }

    /// Run the lookup; when the result names a locator, open it.
    async fn search_web(
        &self,
        session: &SessionId,
        query: &str,
        state: &mut LoopState,
        cancel: &CancellationToken,
    ) -> Applied {
        let Some(lookup) = &self.lookup else {
            return Applied::Outcome(ExecutionOutcome::failure("web lookup is not configured"));
        };
        let limit = Duration::from_millis(self.config.action_timeout_ms);
        let text = match bounded(cancel, limit, lookup.search(query)).await {
            Bounded::Ready(Ok(text)) => text,
            Bounded::Ready(Err(err)) => {
                return Applied::Outcome(ExecutionOutcome::failure(err.to_string()));
            }
            Bounded::TimedOut => {
                return Applied::Outcome(ExecutionOutcome::failure(format!(
                    "web lookup timed out after {}ms",
                    self.config.action_timeout_ms
                )));
            }
            Bounded::Cancelled => return Applied::Cancelled,
        };

        let Some(url) = first_url(&text) else {
            let snippet: String = text.chars().take(SEARCH_SNIPPET_CHARS).collect();
            return Applied::Outcome(ExecutionOutcome::success(format!(
                "Searched web for '{query}': {snippet}"
            )));
        };

        debug!(%query, %url, "search result names a locator, navigating");
        state.executor_calls += 1;
        let navigate = Action::navigate(url.clone()).with_reason("search result");
        Applied::Outcome(match self.execute(session, &navigate).await {
            ExecutionOutcome::Success { .. } => {
                ExecutionOutcome::success(format!("Searched web for '{query}' and opened {url}"))
            }
            ExecutionOutcome::Failure { reason } => ExecutionOutcome::failure(format!(
                "Searched web for '{query}' but opening {url} failed: {reason}"
            )),
        })
    }

    /// Capture afresh and ask the verifier; a matching answer completes the task.
    async fn verify(
        &self,
        session: &SessionId,
        question: &str,
        expected: &str,
        cancel: &CancellationToken,
    ) -> Applied {
        let Some(verifier) = &self.verifier else {
            return Applied::Outcome(ExecutionOutcome::failure("verification is not configured"));
        };

        let perception_timeout = Duration::from_millis(self.config.perception_timeout_ms);
        let observation = match bounded(cancel, perception_timeout, self.perceiver.capture(session)).await {
            Bounded::Ready(Ok(observation)) => observation,
            Bounded::Ready(Err(err)) => {
                return Applied::Outcome(ExecutionOutcome::failure(format!(
                    "Verification capture failed: {err}"
                )));
            }
            Bounded::TimedOut => {
                let err = PerceptionError::Timeout(self.config.perception_timeout_ms);
                return Applied::Outcome(ExecutionOutcome::failure(format!(
                    "Verification capture failed: {err}"
                )));
            }
            Bounded::Cancelled => return Applied::Cancelled,
        };

        let decision_timeout = Duration::from_millis(self.config.decision_timeout_ms);
        let answer = match bounded(
            cancel,
            decision_timeout,
            verifier.answer(question, expected, &observation),
        )
        .await
        {
            Bounded::Ready(Ok(answer)) => answer,
            Bounded::Ready(Err(err)) => {
                return Applied::Outcome(ExecutionOutcome::failure(format!(
                    "Verification unanswered: {question}: {err}"
                )));
            }
            Bounded::TimedOut => {
                let err = DecisionError::Timeout(self.config.decision_timeout_ms);
                return Applied::Outcome(ExecutionOutcome::failure(format!(
                    "Verification unanswered: {question}: {err}"
                )));
            }
            Bounded::Cancelled => return Applied::Cancelled,
        };

        if answer.trim().eq_ignore_ascii_case(expected.trim()) {
            Applied::Verified(format!("Verification passed: {question} ({})", answer.trim()))
        } else {
            Applied::Outcome(ExecutionOutcome::failure(format!(
                "Verification failed: {question}: expected {expected}, got {answer}"
            )))
        }
    }

    fn budget_exhausted(&self, state: LoopState) -> AgentLoopResult {
        let limit = self.config.max_iterations;
        state.finish(
            AgentLoopStatus::Aborted,
            format!("Max iterations reached ({limit}) without completing the task"),
        )
    }
}
