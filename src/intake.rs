//! Task intake: deduplicate, build the task, serialize per session, run.

use std::sync::Arc;

use agent_core::{AgentError, AgentLoopController, AgentLoopResult, Task};
use dashmap::DashMap;
use serde::Serialize;
use taskrelay_core_types::{OriginatorId, RelayError, RequestId, SessionId};
use taskrelay_dedup_gate::{DedupGate, GateDecision, InMemorySeenStore, SeenStore};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    InvalidRequest(#[from] AgentError),

    #[error("seen-id store failed: {0}")]
    Store(#[from] RelayError),
}

/// What happened to one submitted request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Finished(AgentLoopResult),
    AlreadyProcessed,
}

impl SubmitOutcome {
    pub fn result(&self) -> Option<&AgentLoopResult> {
        match self {
            Self::Finished(result) => Some(result),
            Self::AlreadyProcessed => None,
        }
    }
}

pub struct TaskIntake<S = InMemorySeenStore> {
    gate: DedupGate<S>,
    controller: Arc<AgentLoopController>,
    sessions: DashMap<SessionId, Arc<Mutex<()>>>,
    shutdown: CancellationToken,
}

impl<S: SeenStore> TaskIntake<S> {
    pub fn new(store: S, controller: Arc<AgentLoopController>) -> Self {
        Self {
            gate: DedupGate::new(store),
            controller,
            sessions: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn gate(&self) -> &DedupGate<S> {
        &self.gate
    }

    /// Cancel every in-flight and future run on this intake.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Sessions that currently hold a run lock.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub async fn submit(
        &self,
        request_id: RequestId,
        originator: OriginatorId,
        description: &str,
    ) -> Result<SubmitOutcome, IntakeError> {
        if self.gate.admit(&request_id, &originator).await? == GateDecision::AlreadyProcessed {
            info!(originator = %originator, request = %request_id, "request already processed");
            return Ok(SubmitOutcome::AlreadyProcessed);
        }

        let task = match Task::new(description) {
            Ok(task) => task,
            Err(err) => {
                warn!(originator = %originator, request = %request_id, error = %err, "rejected task");
                return Err(err.into());
            }
        };

        let session = SessionId::for_originator(&originator);
        let lock = self
            .sessions
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            let cancel = self.shutdown.child_token();
            info!(
                originator = %originator,
                request = %request_id,
                task_id = %task.id,
                "dispatching task"
            );
            self.controller.run(&session, task, &cancel).await
        };

        drop(lock);
        self.sessions
            .remove_if(&session, |_, lock| Arc::strong_count(lock) == 1);

        Ok(SubmitOutcome::Finished(result))
    }
}
