use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{
    Action, ActionExecutor, ActionKind, AgentLoopConfig, AgentLoopController, AgentLoopStatus,
    ChainResolver, Decision, DecisionError, DecisionProvider, DirectResolver, DirectTarget,
    ExecutionOutcome, LookupError, Observation, ObservationPayload, PerceptionError, Perceiver,
    StagnationKey, Task, UrlPatternResolver, Verifier, WebLookup,
};
use async_trait::async_trait;
use taskrelay_core_types::SessionId;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakePerceiver {
    calls: AtomicU32,
    fail_on: Option<u32>,
    delay: Option<Duration>,
}

#[async_trait]
impl Perceiver for FakePerceiver {
    async fn capture(&self, _session: &SessionId) -> Result<Observation, PerceptionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on == Some(n) {
            return Err(PerceptionError::Unreachable("browser gone".into()));
        }
        Ok(Observation::new(ObservationPayload::Text(format!("frame {n}")))
            .with_url("https://www.youtube.com"))
    }
}

type DecideFn = dyn Fn(u32, &Observation) -> Result<Decision, DecisionError> + Send + Sync;

struct FnDecider {
    calls: AtomicU32,
    seen: Mutex<Vec<Observation>>,
    decide: Box<DecideFn>,
}

impl FnDecider {
    fn new(
        decide: impl Fn(u32, &Observation) -> Result<Decision, DecisionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
            decide: Box::new(decide),
        }
    }
}

#[async_trait]
impl DecisionProvider for FnDecider {
    async fn decide(
        &self,
        observation: &Observation,
        _task: &Task,
    ) -> Result<Decision, DecisionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(observation.clone());
        (self.decide)(n, observation)
    }
}

#[derive(Default)]
struct RecordingExecutor {
    actions: Mutex<Vec<Action>>,
    fail_calls: Vec<u32>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    fn failing_on(calls: Vec<u32>) -> Self {
        Self {
            fail_calls: calls,
            ..Default::default()
        }
    }

    fn count(&self) -> usize {
        self.actions.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, _session: &SessionId, action: &Action) -> ExecutionOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut actions = self.actions.lock().unwrap();
        actions.push(action.clone());
        if self.fail_calls.contains(&(actions.len() as u32)) {
            ExecutionOutcome::failure("element not found")
        } else {
            ExecutionOutcome::success(action.summary())
        }
    }
}

struct Harness {
    perceiver: Arc<FakePerceiver>,
    decider: Arc<FnDecider>,
    executor: Arc<RecordingExecutor>,
}

impl Harness {
    fn new(perceiver: FakePerceiver, decider: FnDecider, executor: RecordingExecutor) -> Self {
        Self {
            perceiver: Arc::new(perceiver),
            decider: Arc::new(decider),
            executor: Arc::new(executor),
        }
    }

    fn controller(&self, config: AgentLoopConfig) -> AgentLoopController {
        AgentLoopController::new(
            config,
            self.perceiver.clone(),
            self.decider.clone(),
            self.executor.clone(),
        )
    }

    fn perceptions(&self) -> u32 {
        self.perceiver.calls.load(Ordering::SeqCst)
    }

    fn decisions(&self) -> u32 {
        self.decider.calls.load(Ordering::SeqCst)
    }
}

struct FixedLookup(&'static str);

#[async_trait]
impl WebLookup for FixedLookup {
    async fn search(&self, query: &str) -> Result<String, LookupError> {
        if query.is_empty() {
            return Err(LookupError("empty query".into()));
        }
        Ok(self.0.to_string())
    }
}

/// Answers every question with the next scripted reply; the last repeats.
struct ScriptedVerifier {
    answers: Vec<&'static str>,
    asked: Mutex<Vec<Observation>>,
}

impl ScriptedVerifier {
    fn new(answers: Vec<&'static str>) -> Self {
        Self {
            answers,
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn answer(
        &self,
        _question: &str,
        _expected: &str,
        observation: &Observation,
    ) -> Result<String, DecisionError> {
        let mut asked = self.asked.lock().unwrap();
        asked.push(observation.clone());
        let answer = self
            .answers
            .get(asked.len() - 1)
            .or_else(|| self.answers.last())
            .copied()
            .unwrap_or("no");
        Ok(answer.to_string())
    }
}

fn verify(question: &str) -> Decision {
    Decision::act(Action::new(ActionKind::Verify {
        question: question.into(),
        expected: "yes".into(),
    }))
}

fn search(query: &str) -> Decision {
    Decision::act(Action::new(ActionKind::SearchWeb {
        query: query.into(),
    }))
}

fn session() -> SessionId {
    SessionId::from("originator:test")
}

fn novel_click(n: u32, _: &Observation) -> Result<Decision, DecisionError> {
    Ok(Decision::act(Action::click(n as i32, n as i32)))
}

#[tokio::test]
async fn direct_target_completes_with_one_navigation() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(novel_click),
        RecordingExecutor::default(),
    );
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_shortcut(Arc::new(UrlPatternResolver::video_links()));
    let task = Task::new("open https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();

    let result = controller.run(&session(), task, &CancellationToken::new()).await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 0);
    assert_eq!(result.executor_calls, 1);
    assert_eq!(harness.executor.count(), 1);
    assert_eq!(harness.perceptions(), 0);
    assert_eq!(harness.decisions(), 0);
    assert_eq!(
        harness.executor.actions.lock().unwrap()[0],
        Action::navigate("https://www.youtube.com/watch?v=dQw4w9WgXcQ").with_reason("direct target")
    );
    assert_eq!(
        result.direct_target.map(|t| t.url),
        Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string())
    );
}

#[tokio::test]
async fn failed_direct_navigation_falls_back_to_loop() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(Decision::done("video playing"))),
        RecordingExecutor::failing_on(vec![1]),
    );
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_shortcut(Arc::new(UrlPatternResolver::video_links()));
    let task = Task::new("play https://youtu.be/abc123").unwrap();

    let result = controller.run(&session(), task, &CancellationToken::new()).await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.executor_calls, 1);
    assert_eq!(harness.perceptions(), 1);
    assert!(result.direct_target.is_some());
}

#[tokio::test]
async fn shortcut_disabled_by_config_is_skipped() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(Decision::done("done"))),
        RecordingExecutor::default(),
    );
    let controller = harness
        .controller(AgentLoopConfig::minimal().shortcut(false))
        .with_shortcut(Arc::new(ChainResolver::new().with(Arc::new(UrlPatternResolver::default()))));
    let task = Task::new("open https://youtu.be/abc123").unwrap();

    let result = controller.run(&session(), task, &CancellationToken::new()).await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(harness.executor.count(), 0);
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn repeated_click_is_stuck_at_third_iteration() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(Decision::act(Action::click(10, 10)))),
        RecordingExecutor::default(),
    );
    let controller = harness.controller(AgentLoopConfig::minimal());

    let result = controller
        .run(&session(), Task::new("like the video").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Stuck);
    assert_eq!(result.iterations, 3);
    assert_eq!(harness.executor.count(), 3);
    assert!(result.message.contains("click(10,10)"));
}

#[tokio::test]
async fn reworded_reasons_still_count_as_repeats() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, _| {
            Ok(Decision::Act {
                action: Action::click(10, 10).with_reason(format!("attempt {n}")),
                raw: Some(format!("{{\"action\":\"click\",\"x\":10,\"y\":10,\"reason\":\"attempt {n}\"}}")),
            })
        }),
        RecordingExecutor::default(),
    );

    let normalized = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("like it").unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(normalized.status, AgentLoopStatus::Stuck);
    assert_eq!(normalized.iterations, 3);

    let raw = harness
        .controller(
            AgentLoopConfig::minimal()
                .stagnation_key(StagnationKey::Raw)
                .max_iterations(6),
        )
        .run(&session(), Task::new("like it").unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(raw.status, AgentLoopStatus::Aborted);
    assert_eq!(raw.iterations, 6);
}

#[tokio::test]
async fn novel_actions_are_aborted_at_budget() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(novel_click),
        RecordingExecutor::default(),
    );
    let controller = harness.controller(AgentLoopConfig::minimal());

    let result = controller
        .run(&session(), Task::new("explore").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Aborted);
    assert_eq!(result.iterations, 20);
    assert_eq!(harness.executor.count(), 20);
    assert_eq!(result.history.len(), 20);
    assert!(result.message.contains("Max iterations"));
}

#[tokio::test]
async fn stuck_wins_over_budget_on_the_same_iteration() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(Decision::act(Action::press_key("Enter")))),
        RecordingExecutor::default(),
    );
    let result = harness
        .controller(AgentLoopConfig::minimal().max_iterations(3))
        .run(&session(), Task::new("submit").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Stuck);
    assert_eq!(result.iterations, 3);
}

#[tokio::test]
async fn perception_failure_on_first_iteration_fails_without_actions() {
    let harness = Harness::new(
        FakePerceiver {
            fail_on: Some(1),
            ..Default::default()
        },
        FnDecider::new(novel_click),
        RecordingExecutor::default(),
    );

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("anything").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Failed);
    assert_eq!(result.executor_calls, 0);
    assert_eq!(harness.executor.count(), 0);
    assert_eq!(harness.decisions(), 0);
    assert!(result.message.contains("browser gone"));
}

#[tokio::test]
async fn done_on_iteration_k_runs_exactly_k_iterations() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, _| {
            if n == 4 {
                Ok(Decision::done("Video is playing"))
            } else {
                novel_click(n, &Observation::new(ObservationPayload::Text(String::new())))
            }
        }),
        RecordingExecutor::default(),
    );

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("play it").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 4);
    assert_eq!(result.executor_calls, 3);
    assert_eq!(result.message, "Video is playing");
}

#[tokio::test]
async fn give_up_fails_with_provider_reason() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| {
            Ok(Decision::GiveUp {
                reason: "captcha wall".into(),
            })
        }),
        RecordingExecutor::default(),
    );
    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("log in").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Failed);
    assert_eq!(result.message, "captcha wall");
}

#[tokio::test]
async fn executor_failure_is_fed_back_not_retried() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, observation| match n {
            1 => Ok(Decision::act(Action::click(1, 1))),
            2 => {
                assert_eq!(
                    observation.feedback,
                    Some(ExecutionOutcome::failure("element not found"))
                );
                assert_eq!(observation.context.len(), 1);
                Ok(Decision::act(Action::click(2, 2)))
            }
            _ => Ok(Decision::done("done")),
        }),
        RecordingExecutor::failing_on(vec![1]),
    );

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("click things").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    let actions = harness.executor.actions.lock().unwrap().clone();
    assert_eq!(actions, vec![Action::click(1, 1), Action::click(2, 2)]);
    assert!(!result.history[0].outcome.is_success());
}

#[tokio::test]
async fn unparsable_decisions_are_tolerated_then_fail() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, _| match n {
            1 => Err(DecisionError::unparsable("no json")),
            2 => Ok(Decision::done("recovered")),
            _ => unreachable!(),
        }),
        RecordingExecutor::default(),
    );
    let recovered = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(recovered.status, AgentLoopStatus::Completed);
    assert_eq!(recovered.iterations, 2);
    assert!(recovered.history[0].action.is_none());

    let always_bad = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Err(DecisionError::unparsable("no json"))),
        RecordingExecutor::default(),
    );
    let failed = always_bad
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(failed.status, AgentLoopStatus::Failed);
    assert_eq!(failed.iterations, 2);
    assert!(
        failed.message.contains("failed 2 times in a row"),
        "{}",
        failed.message
    );
    assert_eq!(always_bad.executor.count(), 0);
}

#[tokio::test]
async fn unparsable_decision_breaks_the_repeat_streak() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, _| match n {
            3 => Err(DecisionError::unparsable("garbled")),
            6 => Ok(Decision::done("ok")),
            _ => Ok(Decision::act(Action::click(10, 10))),
        }),
        RecordingExecutor::default(),
    );

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 6);
    assert_eq!(result.executor_calls, 4);
}

#[tokio::test]
async fn unavailable_provider_fails_immediately() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Err(DecisionError::unavailable("503"))),
        RecordingExecutor::default(),
    );
    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(result.status, AgentLoopStatus::Failed);
    assert_eq!(result.iterations, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_perception_times_out() {
    let harness = Harness::new(
        FakePerceiver {
            delay: Some(Duration::from_secs(120)),
            ..Default::default()
        },
        FnDecider::new(novel_click),
        RecordingExecutor::default(),
    );
    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Failed);
    assert!(result.message.contains("timed out"));
    assert_eq!(harness.decisions(), 0);
}

#[tokio::test]
async fn cancelled_token_stops_before_any_call() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(novel_click),
        RecordingExecutor::default(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &cancel)
        .await;

    assert_eq!(result.status, AgentLoopStatus::Cancelled);
    assert_eq!(harness.perceptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_pending_capture() {
    let harness = Harness::new(
        FakePerceiver {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        },
        FnDecider::new(novel_click),
        RecordingExecutor::default(),
    );
    let controller = Arc::new(harness.controller(AgentLoopConfig::minimal()));
    let cancel = CancellationToken::new();

    let run = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            controller
                .run(&session(), Task::new("t").unwrap(), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = run.await.unwrap();
    assert_eq!(result.status, AgentLoopStatus::Cancelled);
    assert_eq!(harness.executor.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_controller_serves_concurrent_runs() {
    struct Echo;

    #[async_trait]
    impl DirectResolver for Echo {
        async fn resolve(&self, _task: &str) -> Option<DirectTarget> {
            None
        }
    }

    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(Decision::act(Action::click(10, 10)))),
        RecordingExecutor::default(),
    );
    let controller = Arc::new(
        harness
            .controller(AgentLoopConfig::minimal())
            .with_shortcut(Arc::new(Echo)),
    );

    let runs: Vec<_> = (0..4)
        .map(|i| {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .run(
                        &SessionId::from(format!("originator:{i}")),
                        Task::new("spin").unwrap(),
                        &CancellationToken::new(),
                    )
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(runs).await {
        let result = result.unwrap();
        assert_eq!(result.status, AgentLoopStatus::Stuck);
        assert_eq!(result.iterations, 3);
    }
    assert_eq!(harness.executor.count(), 12);
}

#[tokio::test(start_paused = true)]
async fn slow_action_times_out_and_is_fed_back() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, observation| match n {
            1 => Ok(Decision::act(Action::click(3, 3))),
            _ => {
                let feedback = observation.feedback.clone().expect("feedback");
                assert!(!feedback.is_success());
                assert_eq!(feedback, ExecutionOutcome::failure("action timed out after 1000ms"));
                Ok(Decision::done("moved on"))
            }
        }),
        RecordingExecutor {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        },
    );

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.executor_calls, 1);
    assert!(!result.history[0].outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn slow_decision_times_out_and_fails() {
    struct Stalled;

    #[async_trait]
    impl DecisionProvider for Stalled {
        async fn decide(
            &self,
            _observation: &Observation,
            _task: &Task,
        ) -> Result<Decision, DecisionError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(Decision::done("too late"))
        }
    }

    let executor = Arc::new(RecordingExecutor::default());
    let controller = AgentLoopController::new(
        AgentLoopConfig::minimal(),
        Arc::new(FakePerceiver::default()),
        Arc::new(Stalled),
        executor.clone(),
    );

    let result = controller
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Failed);
    assert_eq!(result.iterations, 1);
    assert!(result.message.contains("decision timed out after 1000ms"), "{}", result.message);
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn passing_verification_completes_on_a_fresh_capture() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(verify("Is the video playing?"))),
        RecordingExecutor::default(),
    );
    let verifier = Arc::new(ScriptedVerifier::new(vec!["yes"]));
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_verifier(verifier.clone());

    let result = controller
        .run(&session(), Task::new("play it").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.executor_calls, 0);
    assert!(result.message.contains("Is the video playing?"));
    assert_eq!(harness.perceptions(), 2);
    assert_eq!(harness.executor.count(), 0);
    let asked = verifier.asked.lock().unwrap();
    assert!(matches!(&asked[0].payload, ObservationPayload::Text(text) if text == "frame 2"));
}

#[tokio::test]
async fn failed_verification_is_fed_back() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, observation| match n {
            1 => Ok(verify("Is the video playing?")),
            2 => {
                match &observation.feedback {
                    Some(ExecutionOutcome::Failure { reason }) => {
                        assert!(reason.contains("expected yes, got no"), "{reason}")
                    }
                    other => panic!("unexpected feedback {other:?}"),
                }
                Ok(Decision::act(Action::click(5, 5)))
            }
            _ => Ok(verify("Is the video playing?")),
        }),
        RecordingExecutor::default(),
    );
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_verifier(Arc::new(ScriptedVerifier::new(vec!["no", "yes"])));

    let result = controller
        .run(&session(), Task::new("play it").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 3);
    assert_eq!(harness.executor.count(), 1);
}

#[tokio::test]
async fn repeated_verification_is_capped() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, _| Ok(verify(&format!("Check number {n}?")))),
        RecordingExecutor::default(),
    );
    let verifier = Arc::new(ScriptedVerifier::new(vec!["no"]));
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_verifier(verifier.clone());

    let result = controller
        .run(&session(), Task::new("play it").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.iterations, 3);
    assert!(result.message.contains("assuming the task is complete"));
    assert_eq!(verifier.asked.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn verification_without_verifier_is_a_failure_outcome() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, observation| match n {
            1 => Ok(verify("Is it done?")),
            _ => {
                assert_eq!(
                    observation.feedback,
                    Some(ExecutionOutcome::failure("verification is not configured"))
                );
                Ok(Decision::done("done"))
            }
        }),
        RecordingExecutor::default(),
    );

    let result = harness
        .controller(AgentLoopConfig::minimal())
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(harness.perceptions(), 2);
}

#[tokio::test]
async fn search_result_locator_is_opened() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, observation| match n {
            1 => Ok(search("timeless youtube")),
            _ => {
                assert!(observation.context[0].contains("opened https://www.youtube.com/watch?v=5EpyN_6dqyk"));
                Ok(Decision::done("playing"))
            }
        }),
        RecordingExecutor::default(),
    );
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_lookup(Arc::new(FixedLookup(
            "Top result: https://www.youtube.com/watch?v=5EpyN_6dqyk (official video)",
        )));

    let result = controller
        .run(&session(), Task::new("find timeless").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.executor_calls, 1);
    assert_eq!(
        harness.executor.actions.lock().unwrap()[0],
        Action::navigate("https://www.youtube.com/watch?v=5EpyN_6dqyk").with_reason("search result")
    );
}

#[tokio::test]
async fn search_without_locator_feeds_result_text_back() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|n, observation| match n {
            1 => Ok(search("weather berlin")),
            _ => {
                assert_eq!(
                    observation.context,
                    vec!["Searched web for 'weather berlin': Sunny, 21 degrees".to_string()]
                );
                Ok(Decision::done("answered"))
            }
        }),
        RecordingExecutor::default(),
    );
    let controller = harness
        .controller(AgentLoopConfig::minimal())
        .with_lookup(Arc::new(FixedLookup("Sunny, 21 degrees")));

    let result = controller
        .run(&session(), Task::new("check the weather").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Completed);
    assert_eq!(result.executor_calls, 0);
    assert_eq!(harness.executor.count(), 0);
}

#[tokio::test]
async fn repeated_search_is_stuck() {
    let harness = Harness::new(
        FakePerceiver::default(),
        FnDecider::new(|_, _| Ok(search("weather berlin"))),
        RecordingExecutor::default(),
    );
    let result = harness
        .controller(AgentLoopConfig::minimal())
        .with_lookup(Arc::new(FixedLookup("Sunny")))
        .run(&session(), Task::new("t").unwrap(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, AgentLoopStatus::Stuck);
    assert_eq!(result.iterations, 3);
    assert!(result.message.contains("search_web(weather berlin)"));
}
