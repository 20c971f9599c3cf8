//! Decision-provider response contract.
//!
//! Models reply with a single JSON object such as
//! `{"action": "click", "x": 640, "y": 65, "reason": "search bar"}`,
//! often wrapped in prose or a fenced block. This module extracts and
//! validates that object and offers a model-backed [`DecisionProvider`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::agent_loop::types::{
    Action, ActionKind, Decision, ExecutionOutcome, Observation, ScrollDirection,
};
use crate::errors::DecisionError;
use crate::model::Task;
use crate::ports::{DecisionProvider, Verifier, VisionModel};

const DEFAULT_SCROLL_AMOUNT: i32 = 300;

/// Pull the first JSON object out of a model reply.
///
/// Looks inside a fenced block when there is one, otherwise scans the whole
/// reply. Text after the object is ignored. When no complete object parses,
/// the span from the first `{` to the last `}` is returned so the caller
/// gets a meaningful JSON error.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let body = fenced_body(raw).unwrap_or(raw);
    first_complete_object(body)
        .or_else(|| brace_span(body))
        .map(str::to_string)
}

/// Contents of the first fenced block that holds a `{`.
fn fenced_body(raw: &str) -> Option<&str> {
    const FENCE: &str = "```";
    let (_, after_open) = raw.split_once(FENCE)?;
    let block_start = after_open.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
    let (block, _) = block_start.split_once(FENCE)?;
    block.contains('{').then_some(block)
}

fn first_complete_object(text: &str) -> Option<&str> {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find('{') {
        let candidate = &text[offset + pos..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
        if let Some(Ok(Value::Object(_))) = stream.next() {
            return Some(&candidate[..stream.byte_offset()]);
        }
        offset += pos + 1;
    }
    None
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
struct RawDirective {
    action: String,
    url: Option<String>,
    x: Option<i32>,
    y: Option<i32>,
    text: Option<String>,
    key: Option<String>,
    direction: Option<ScrollDirection>,
    amount: Option<i32>,
    seconds: Option<f64>,
    ms: Option<u64>,
    message: Option<String>,
    success: Option<bool>,
    reason: Option<String>,
    query: Option<String>,
    question: Option<String>,
    expected: Option<String>,
}

/// Parse a raw decision-provider response into a [`Decision`].
///
/// Every failure is [`DecisionError::Unparsable`], which the loop treats
/// as recoverable.
pub fn parse_decision(raw: &str) -> Result<Decision, DecisionError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| DecisionError::unparsable(format!("no JSON object in response: {}", preview(raw))))?;
    let directive: RawDirective = serde_json::from_str(&json)
        .map_err(|err| DecisionError::unparsable(format!("invalid decision JSON: {err}")))?;

    let missing = |field: &str| {
        DecisionError::unparsable(format!(
            "`{}` action is missing `{field}`",
            directive.action
        ))
    };

    let kind = match directive.action.trim().to_lowercase().as_str() {
        "navigate" => ActionKind::Navigate {
            url: directive.url.clone().ok_or_else(|| missing("url"))?,
        },
        "click" => ActionKind::Click {
            x: directive.x.ok_or_else(|| missing("x"))?,
            y: directive.y.ok_or_else(|| missing("y"))?,
        },
        "type" | "type_text" => ActionKind::TypeText {
            text: directive.text.clone().ok_or_else(|| missing("text"))?,
        },
        "press_key" | "key" => ActionKind::PressKey {
            key: directive.key.clone().unwrap_or_else(|| "Enter".to_string()),
        },
        "scroll" => ActionKind::Scroll {
            direction: directive.direction.unwrap_or(ScrollDirection::Down),
            amount: directive.amount.unwrap_or(DEFAULT_SCROLL_AMOUNT),
        },
        "wait" => ActionKind::Wait {
            ms: directive
                .ms
                .or_else(|| directive.seconds.map(|s| (s.max(0.0) * 1000.0) as u64))
                .unwrap_or(2_000),
        },
        "search_web" | "search" => ActionKind::SearchWeb {
            query: non_blank(directive.query.clone()).ok_or_else(|| missing("query"))?,
        },
        "verify" => ActionKind::Verify {
            question: non_blank(directive.question.clone()).ok_or_else(|| missing("question"))?,
            expected: non_blank(directive.expected.clone())
                .unwrap_or_else(|| "yes".to_string())
                .to_lowercase(),
        },
        "complete" | "done" => {
            let message = directive
                .message
                .clone()
                .unwrap_or_else(|| "Task completed".to_string());
            return Ok(if directive.success.unwrap_or(true) {
                Decision::Done { message }
            } else {
                Decision::GiveUp { reason: message }
            });
        }
        "error" => {
            return Ok(Decision::GiveUp {
                reason: directive
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        other => {
            return Err(DecisionError::unparsable(format!("unknown action `{other}`")));
        }
    };

    let mut action = Action::new(kind);
    action.reason = directive.reason;
    Ok(Decision::Act {
        action,
        raw: Some(raw.trim().to_string()),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a yes/no verification reply.
///
/// Accepts `{"answer": "yes"}` (fenced or not) or a bare reply whose first
/// word is `yes` or `no`. Answers are lowercased.
pub fn parse_verification_answer(reply: &str) -> Option<String> {
    if let Some(json) = extract_json_object(reply) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&json) {
            if let Some(answer) = map.get("answer").and_then(Value::as_str) {
                let answer = answer.trim().to_lowercase();
                if !answer.is_empty() {
                    return Some(answer);
                }
            }
        }
    }
    reply
        .split(|c: char| !c.is_alphanumeric())
        .find(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| word == "yes" || word == "no")
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 120;
    if raw.chars().count() <= LIMIT {
        raw.to_string()
    } else {
        let head: String = raw.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}

/// Build the prompt that asks a model for the next action.
pub fn build_decision_prompt(task: &Task, observation: &Observation) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are controlling a web browser to complete this task: ");
    prompt.push_str(&task.description);
    prompt.push_str("\n\n");

    if let Some(url) = &observation.url {
        prompt.push_str(&format!("Current URL: {url}\n"));
    }
    if !observation.context.is_empty() {
        prompt.push_str("Previous steps:\n");
        for line in &observation.context {
            prompt.push_str("- ");
            prompt.push_str(line);
            prompt.push('\n');
        }
    }
    if let Some(ExecutionOutcome::Failure { reason }) = &observation.feedback {
        prompt.push_str(&format!(
            "The last action FAILED: {reason}. Choose a different action.\n"
        ));
    }

    prompt.push_str("\nRespond with ONLY one JSON object, one of:\n");
    prompt.push_str(ACTION_CONTRACT.trim());
    prompt
}

const ACTION_CONTRACT: &str = r#"
{"action": "navigate", "url": "https://example.com"}
{"action": "click", "x": 640, "y": 360, "reason": "why"}
{"action": "type", "text": "text to type", "reason": "why"}
{"action": "press_key", "key": "Enter", "reason": "why"}
{"action": "scroll", "direction": "down", "amount": 300}
{"action": "wait", "seconds": 2, "reason": "why"}
{"action": "search_web", "query": "exact search query"}
{"action": "verify", "question": "Is the video playing?", "expected": "yes"}
{"action": "complete", "message": "what was achieved", "success": true}
{"action": "error", "message": "why the task cannot be done"}
Use "complete" as soon as the screenshot shows the task is done.
"#;

/// Decision provider backed by a vision/language model.
pub struct ModelDecisionProvider<M> {
    model: M,
}

impl<M: VisionModel> ModelDecisionProvider<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: VisionModel> DecisionProvider for ModelDecisionProvider<M> {
    async fn decide(
        &self,
        observation: &Observation,
        task: &Task,
    ) -> Result<Decision, DecisionError> {
        let prompt = build_decision_prompt(task, observation);
        let reply = self.model.complete(&prompt, observation).await?;
        debug!(task_id = %task.id, reply = %preview(&reply), "model decision");
        parse_decision(&reply)
    }
}

/// Verifier that asks a vision/language model a yes/no question.
pub struct ModelVerifier<M> {
    model: M,
}

impl<M: VisionModel> ModelVerifier<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: VisionModel> Verifier for ModelVerifier<M> {
    async fn answer(
        &self,
        question: &str,
        expected: &str,
        observation: &Observation,
    ) -> Result<String, DecisionError> {
        let prompt = format!(
            "{question}\n\nLook at the current page and answer with ONLY one JSON object:\n\
             {{\"answer\": \"yes\"}} or {{\"answer\": \"no\"}}\n\nExpected answer: {expected}"
        );
        let reply = self.model.complete(&prompt, observation).await?;
        debug!(%question, reply = %preview(&reply), "verification reply");
        parse_verification_answer(&reply).ok_or_else(|| {
            DecisionError::unparsable(format!("no yes/no answer in reply: {}", preview(&reply)))
        })
    }
}
