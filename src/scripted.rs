//! Scripted collaborators for offline runs.
//!
//! A scenario file describes a task plus the responses the environment and
//! the decision provider give, so the whole intake → shortcut → loop path
//! can run without a browser or a model.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use agent_core::{
    parse_decision, parse_verification_answer, Action, ActionExecutor, ActionKind,
    AgentLoopConfig, AgentLoopController, ChainResolver, Decision, DecisionError,
    DecisionProvider, ExecutionOutcome, LookupError, LookupResolver, Observation,
    ObservationPayload, PerceptionError, Perceiver, Task, UrlPatternResolver, Verifier,
    WebLookup,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use taskrelay_core_types::SessionId;
use tokio::fs;
use tracing::debug;

/// YAML scenario consumed by `taskrelay run`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioFile {
    pub task: String,
    /// Page the scripted browser starts on.
    pub start_url: Option<String>,
    /// Web lookup responses keyed by query. Serves both the shortcut and
    /// `search_web` actions.
    pub lookup: BTreeMap<String, String>,
    /// Raw decision-provider responses, in order. The last one repeats.
    pub decisions: Vec<String>,
    /// Raw verifier replies to `verify` actions, in order. The last one repeats.
    pub verifications: Vec<String>,
    /// 1-based capture numbers that fail.
    pub perception_failures: Vec<u32>,
    /// 1-based action numbers that fail.
    pub executor_failures: Vec<u32>,
}

impl ScenarioFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(content).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            bail!("scenario task cannot be empty");
        }
        if self.perception_failures.contains(&0) || self.executor_failures.contains(&0) {
            bail!("failure indices are 1-based");
        }
        Ok(())
    }
}

/// Page state shared by the scripted perceiver and executor.
#[derive(Debug, Default)]
struct PageState {
    url: Option<String>,
}

pub struct ScriptedPerceiver {
    page: Arc<Mutex<PageState>>,
    failures: BTreeSet<u32>,
    captures: AtomicU32,
}

impl ScriptedPerceiver {
    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Perceiver for ScriptedPerceiver {
    async fn capture(&self, session: &SessionId) -> Result<Observation, PerceptionError> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failures.contains(&n) {
            return Err(PerceptionError::Unreachable(format!(
                "scripted capture {n} failed"
            )));
        }
        let url = self.page.lock().url.clone();
        debug!(session = %session, capture = n, url = ?url, "scripted capture");
        let mut observation = Observation::new(ObservationPayload::Text(format!(
            "scripted page after {} captures",
            n
        )));
        observation.url = url;
        Ok(observation)
    }
}

pub struct ScriptedDecisions {
    responses: Vec<String>,
    cursor: AtomicUsize,
}

impl ScriptedDecisions {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisions {
    async fn decide(
        &self,
        _observation: &Observation,
        _task: &Task,
    ) -> Result<Decision, DecisionError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let raw = self
            .responses
            .get(index)
            .or_else(|| self.responses.last())
            .ok_or_else(|| DecisionError::unavailable("scenario has no scripted decisions"))?;
        parse_decision(raw)
    }
}

/// Verifier that replays scripted model replies.
pub struct ScriptedVerifier {
    replies: Vec<String>,
    cursor: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn questions_answered(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn answer(
        &self,
        question: &str,
        _expected: &str,
        _observation: &Observation,
    ) -> Result<String, DecisionError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(index)
            .or_else(|| self.replies.last())
            .ok_or_else(|| DecisionError::unavailable("scenario has no scripted verifications"))?;
        debug!(%question, %reply, "scripted verification");
        parse_verification_answer(reply)
            .ok_or_else(|| DecisionError::unparsable(format!("no yes/no answer in `{reply}`")))
    }
}

/// Executor that records every action and fails on scripted indices.
pub struct RecordingExecutor {
    page: Arc<Mutex<PageState>>,
    failures: BTreeSet<u32>,
    actions: Mutex<Vec<Action>>,
}

impl RecordingExecutor {
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.actions.lock().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, _session: &SessionId, action: &Action) -> ExecutionOutcome {
        let number = {
            let mut actions = self.actions.lock();
            actions.push(action.clone());
            actions.len() as u32
        };
        if self.failures.contains(&number) {
            return ExecutionOutcome::failure(format!("scripted failure on action {number}"));
        }
        if let ActionKind::Navigate { url } = &action.kind {
            self.page.lock().url = Some(url.clone());
        }
        ExecutionOutcome::success(action.summary())
    }
}

pub struct ScriptedLookup {
    responses: BTreeMap<String, String>,
}

impl ScriptedLookup {
    pub fn new(responses: BTreeMap<String, String>) -> Self {
        Self { responses }
    }
}

#[async_trait]
impl WebLookup for ScriptedLookup {
    async fn search(&self, query: &str) -> Result<String, LookupError> {
        self.responses
            .get(query)
            .cloned()
            .ok_or_else(|| LookupError(format!("no scripted result for `{query}`")))
    }
}

/// Collaborators wired from one scenario.
pub struct ScriptedAgent {
    pub controller: Arc<AgentLoopController>,
    pub perceiver: Arc<ScriptedPerceiver>,
    pub executor: Arc<RecordingExecutor>,
    pub verifier: Arc<ScriptedVerifier>,
}

impl ScenarioFile {
    pub fn build_agent(&self, config: AgentLoopConfig) -> ScriptedAgent {
        let page = Arc::new(Mutex::new(PageState {
            url: self.start_url.clone(),
        }));
        let perceiver = Arc::new(ScriptedPerceiver {
            page: Arc::clone(&page),
            failures: self.perception_failures.iter().copied().collect(),
            captures: AtomicU32::new(0),
        });
        let executor = Arc::new(RecordingExecutor {
            page,
            failures: self.executor_failures.iter().copied().collect(),
            actions: Mutex::new(Vec::new()),
        });
        let decisions = Arc::new(ScriptedDecisions::new(self.decisions.clone()));
        let verifier = Arc::new(ScriptedVerifier::new(self.verifications.clone()));

        let mut resolver = ChainResolver::new().with(Arc::new(UrlPatternResolver::video_links()));
        if !self.lookup.is_empty() {
            resolver = resolver.with(Arc::new(LookupResolver::new(ScriptedLookup::new(
                self.lookup.clone(),
            ))));
        }

        let controller = AgentLoopController::new(
            config,
            perceiver.clone(),
            decisions,
            executor.clone(),
        )
        .with_shortcut(Arc::new(resolver))
        .with_lookup(Arc::new(ScriptedLookup::new(self.lookup.clone())))
        .with_verifier(verifier.clone());

        ScriptedAgent {
            controller: Arc::new(controller),
            perceiver,
            executor,
            verifier,
        }
    }
}
