//! Direct-resolution shortcut.
//!
//! When a task names an unambiguous target (a video URL, or one a web
//! lookup can recover from the task's subject) the agent navigates there
//! once and skips the observe-decide-act loop entirely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use taskrelay_core_types::SessionId;
use tracing::{debug, info, warn};

use crate::agent_loop::types::{Action, ExecutionOutcome};
use crate::errors::ExecutionError;
use crate::model::{DirectTarget, Task};
use crate::ports::{ActionExecutor, DirectResolver, WebLookup};

static VIDEO_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)[A-Za-z0-9_-]+")
        .expect("valid video url pattern")
});

static ANY_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid url pattern"));

/// Words that mark a task as multi-step; such tasks never take the lookup path.
const MULTI_STEP_MARKERS: &[&str] = &["search", "find", "look for", "then", "after"];
const OPEN_VERBS: &[&str] = &["play", "open"];
const FILLER_WORDS: &[&str] = &["play", "open", "show", "me", "find", "on", "youtube"];

/// Finds a locator already embedded in the task text.
#[derive(Debug, Clone)]
pub struct UrlPatternResolver {
    pattern: Regex,
}

impl UrlPatternResolver {
    /// Resolver for YouTube watch / short links.
    pub fn video_links() -> Self {
        Self {
            pattern: VIDEO_URL_PATTERN.clone(),
        }
    }

    pub fn with_pattern(pattern: Regex) -> Self {
        Self { pattern }
    }

    pub fn find(&self, text: &str) -> Option<String> {
        self.pattern.find(text).map(|m| m.as_str().to_string())
    }
}

impl Default for UrlPatternResolver {
    fn default() -> Self {
        Self::video_links()
    }
}

#[async_trait]
impl DirectResolver for UrlPatternResolver {
    async fn resolve(&self, task_description: &str) -> Option<DirectTarget> {
        self.find(task_description)
            .map(|url| DirectTarget::new(url, "pattern"))
    }
}

/// Recovers a locator for simple "play X on youtube" tasks via a web lookup.
pub struct LookupResolver<L> {
    lookup: L,
    host_keyword: String,
    pattern: UrlPatternResolver,
}

impl<L: WebLookup> LookupResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            host_keyword: "youtube".to_string(),
            pattern: UrlPatternResolver::video_links(),
        }
    }
}

/// First http(s) locator in free text, without trailing punctuation.
pub fn first_url(text: &str) -> Option<String> {
    ANY_URL_PATTERN
        .find(text)
        .map(|m| m.as_str().trim_end_matches(|c: char| ".,;:!?)]}".contains(c)))
        .filter(|url| url.split_once("://").is_some_and(|(_, rest)| !rest.is_empty()))
        .map(str::to_string)
}

/// A task qualifies when it asks to open/play something on the host and
/// contains no multi-step wording.
pub fn is_simple_open_task(description: &str, host_keyword: &str) -> bool {
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_verb = OPEN_VERBS.iter().any(|verb| words.contains(verb));
    let names_host = words.contains(&host_keyword);
    let multi_step = MULTI_STEP_MARKERS.iter().any(|marker| {
        let marker_words: Vec<&str> = marker.split(' ').collect();
        words
            .windows(marker_words.len())
            .any(|window| window == marker_words.as_slice())
    });
    has_verb && names_host && !multi_step
}

/// Strip verbs and host words, keep the subject, append the host name.
pub fn subject_query(description: &str, host_keyword: &str) -> Option<String> {
    let lower = description.to_lowercase();
    let subject: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !FILLER_WORDS.contains(w) && *w != host_keyword)
        .collect();
    if subject.is_empty() {
        return None;
    }
    Some(format!("{} {host_keyword}", subject.join(" ")))
}

#[async_trait]
impl<L: WebLookup> DirectResolver for LookupResolver<L> {
    async fn resolve(&self, task_description: &str) -> Option<DirectTarget> {
        if !is_simple_open_task(task_description, &self.host_keyword) {
            return None;
        }
        let query = subject_query(task_description, &self.host_keyword)?;
        debug!(%query, "looking up direct target");
        match self.lookup.search(&query).await {
            Ok(text) => {
                let found = self.pattern.find(&text);
                if found.is_none() {
                    debug!(%query, "lookup returned no direct target");
                }
                found.map(|url| DirectTarget::new(url, "lookup"))
            }
            Err(err) => {
                warn!(%query, error = %err, "direct target lookup failed");
                None
            }
        }
    }
}

/// Tries resolvers in order; the first one with a target wins.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn DirectResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn DirectResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[async_trait]
impl DirectResolver for ChainResolver {
    async fn resolve(&self, task_description: &str) -> Option<DirectTarget> {
        for resolver in &self.resolvers {
            if let Some(target) = resolver.resolve(task_description).await {
                return Some(target);
            }
        }
        None
    }
}

/// Outcome of a shortcut attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ShortcutOutcome {
    /// Navigation to the target succeeded; the task is done.
    Completed {
        target: DirectTarget,
        detail: String,
    },
    /// Continue with the general loop. `target` is set when one was found
    /// but navigating to it failed.
    FallThrough {
        target: Option<DirectTarget>,
        reason: String,
    },
}

/// Resolve-then-navigate front door of the agent.
pub struct DirectShortcut {
    resolver: Arc<dyn DirectResolver>,
    executor: Arc<dyn ActionExecutor>,
    action_timeout: Duration,
}

impl DirectShortcut {
    pub fn new(
        resolver: Arc<dyn DirectResolver>,
        executor: Arc<dyn ActionExecutor>,
        action_timeout_ms: u64,
    ) -> Self {
        Self {
            resolver,
            executor,
            action_timeout: Duration::from_millis(action_timeout_ms),
        }
    }

    /// Issue at most one navigate action; never observes or decides.
    pub async fn attempt(&self, session: &SessionId, task: &mut Task) -> ShortcutOutcome {
        let Some(target) = self.resolver.resolve(&task.description).await else {
            return ShortcutOutcome::FallThrough {
                target: None,
                reason: "no direct target found".to_string(),
            };
        };
        task.direct_target = Some(target.clone());
        info!(
            task_id = %task.id,
            url = %target.url,
            source = %target.source,
            "direct target resolved, navigating"
        );

        let action = Action::navigate(target.url.clone()).with_reason("direct target");
        let outcome = match tokio::time::timeout(
            self.action_timeout,
            self.executor.execute(session, &action),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ExecutionError::Timeout(self.action_timeout.as_millis() as u64).into(),
        };

        match outcome {
            ExecutionOutcome::Success { detail } => ShortcutOutcome::Completed { target, detail },
            ExecutionOutcome::Failure { reason } => {
                warn!(task_id = %task.id, %reason, "direct navigation failed, falling back to loop");
                ShortcutOutcome::FallThrough {
                    target: Some(target),
                    reason,
                }
            }
        }
    }
}
