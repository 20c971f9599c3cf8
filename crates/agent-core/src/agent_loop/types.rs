//! Core data types exchanged between the loop and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;

/// Snapshot of environment state at one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// 1-indexed capture number within a task. Set by the loop.
    pub sequence: u32,

    /// Opaque payload produced by the perceiver.
    pub payload: ObservationPayload,

    /// Current page URL, if the perceiver knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Outcome of the previous action. Set by the loop so the decision
    /// provider can re-plan after a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<ExecutionOutcome>,

    /// Short summaries of the most recent iterations, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(payload: ObservationPayload) -> Self {
        Self {
            sequence: 0,
            payload,
            url: None,
            feedback: None,
            context: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Observation payload; the loop never looks inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ObservationPayload {
    /// Base64-encoded screenshot.
    Screenshot {
        image_base64: String,
        width: u32,
        height: u32,
    },
    /// Structured page state (DOM summary, accessibility tree, ...).
    Structured(serde_json::Value),
    /// Plain text description.
    Text(String),
}

/// A decided next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,

    /// Provider's stated reason. Not part of the signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, reason: None }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(ActionKind::Navigate { url: url.into() })
    }

    pub fn click(x: i32, y: i32) -> Self {
        Self::new(ActionKind::Click { x, y })
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Self::new(ActionKind::TypeText { text: text.into() })
    }

    pub fn press_key(key: impl Into<String>) -> Self {
        Self::new(ActionKind::PressKey { key: key.into() })
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Normalized action signature: kind plus parameters.
    ///
    /// Strings are trimmed, key names lowercased, and the free-text reason
    /// is left out so that cosmetic rephrasing maps to the same signature.
    pub fn signature(&self) -> String {
        match &self.kind {
            ActionKind::Navigate { url } => format!("navigate({})", url.trim()),
            ActionKind::Click { x, y } => format!("click({x},{y})"),
            ActionKind::TypeText { text } => format!("type({})", text.trim()),
            ActionKind::Scroll { direction, amount } => {
                format!("scroll({},{amount})", direction.as_str())
            }
            ActionKind::PressKey { key } => format!("key({})", key.trim().to_lowercase()),
            ActionKind::Wait { ms } => format!("wait({ms})"),
            ActionKind::SearchWeb { query } => format!("search_web({})", query.trim()),
            ActionKind::Verify { question, expected } => format!(
                "verify({},{})",
                question.trim(),
                expected.trim().to_lowercase()
            ),
        }
    }

    /// Brief, human-readable description used in context lines and logs.
    pub fn summary(&self) -> String {
        let base = match &self.kind {
            ActionKind::Navigate { url } => format!("Navigated to {url}"),
            ActionKind::Click { x, y } => format!("Clicked at ({x}, {y})"),
            ActionKind::TypeText { text } => format!("Typed: {text}"),
            ActionKind::Scroll { direction, amount } => {
                format!("Scrolled {} by {amount}px", direction.as_str())
            }
            ActionKind::PressKey { key } => format!("Pressed: {key}"),
            ActionKind::Wait { ms } => format!("Waited {ms}ms"),
            ActionKind::SearchWeb { query } => format!("Searched web for '{query}'"),
            ActionKind::Verify { question, .. } => format!("Verified: {question}"),
        };
        match &self.reason {
            Some(reason) if !reason.trim().is_empty() => format!("{base}: {}", reason.trim()),
            _ => base,
        }
    }
}

/// Supported action kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    Navigate { url: String },
    Click { x: i32, y: i32 },
    TypeText { text: String },
    Scroll { direction: ScrollDirection, amount: i32 },
    PressKey { key: String },
    Wait { ms: u64 },
    /// Free-text web search. Handled by the loop through its lookup port.
    SearchWeb { query: String },
    /// Yes/no check against a fresh capture. Handled by the loop.
    Verify { question: String, expected: String },
}

impl ActionKind {
    /// Whether the executor applies this action. The loop handles the rest
    /// itself and never hands them to the executor.
    pub fn is_environment(&self) -> bool {
        !matches!(self, Self::SearchWeb { .. } | Self::Verify { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// What the decision provider returns for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Apply an action. `raw` carries the provider's unprocessed response
    /// when one exists.
    Act {
        action: Action,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    /// The task is already satisfied.
    Done { message: String },
    /// The provider cannot make progress and says so.
    GiveUp { reason: String },
}

impl Decision {
    pub fn act(action: Action) -> Self {
        Self::Act { action, raw: None }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::Done {
            message: message.into(),
        }
    }
}

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { detail: String },
    Failure { reason: String },
}

impl ExecutionOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self::Success {
            detail: detail.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<ExecutionError> for ExecutionOutcome {
    fn from(err: ExecutionError) -> Self {
        Self::failure(err.to_string())
    }
}

/// One loop pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number (1-indexed).
    pub index: u32,

    /// `None` when the decision provider returned an unparsable response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    pub outcome: ExecutionOutcome,

    /// Normalized signature of the action. Under `StagnationKey::Raw` the
    /// window compares the raw response instead, so this is not always the
    /// pushed key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    /// Context line handed to later decision rounds.
    pub fn context_line(&self) -> String {
        match (&self.action, &self.outcome) {
            (Some(action), ExecutionOutcome::Success { detail }) if !action.kind.is_environment() => {
                detail.clone()
            }
            (Some(action), ExecutionOutcome::Success { .. }) => action.summary(),
            (Some(action), ExecutionOutcome::Failure { reason }) => {
                format!("{} (failed: {reason})", action.summary())
            }
            (None, ExecutionOutcome::Failure { reason }) => format!("No action: {reason}"),
            (None, ExecutionOutcome::Success { detail }) => detail.clone(),
        }
    }
}
