//! End-to-end tests for the orchestrator with scripted mock providers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use nudge::providers::EventStream;
use nudge::{
    AssistProvider, AssistRequest, AssistResponse, CostLimits, CostTracker, Difficulty,
    Encouragement, EncouragementContext, EncouragementRequest, Generation, Mood, NudgeError,
    Orchestrator, RetryPolicy, ShrinkRequest, ShrinkResult, ShrinkStep, StreamEvent, Tone, Usage,
};

// ============================================================================
// Mock provider
// ============================================================================

/// Replays scripted outcomes, then answers with a default generation.
struct Scripted {
    name: &'static str,
    available: AtomicBool,
    down_after_first_call: bool,
    latency: Option<Duration>,
    cost_per_call: f64,
    script: Mutex<VecDeque<Result<Generation, NudgeError>>>,
    chunks: Option<Vec<&'static str>>,
    calls: AtomicU32,
    seen: Mutex<Vec<AssistRequest>>,
}

impl Scripted {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            available: AtomicBool::new(true),
            down_after_first_call: false,
            latency: None,
            cost_per_call: 0.0,
            script: Mutex::new(VecDeque::new()),
            chunks: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    /// Report unavailable once the first call has been made.
    fn goes_down_after_first_call(mut self) -> Self {
        self.down_after_first_call = true;
        self
    }

    fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn cost_per_call(mut self, cost: f64) -> Self {
        self.cost_per_call = cost;
        self
    }

    fn then(self, outcome: Result<Generation, NudgeError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    fn streaming(mut self, chunks: Vec<&'static str>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, request: &AssistRequest) -> Result<Generation, NudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down_after_first_call {
            self.available.store(false, Ordering::SeqCst);
        }
        self.seen.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(default_generation(self.name, request)))
    }
}

#[async_trait]
impl AssistProvider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: &AssistRequest) -> nudge::Result<Generation> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_outcome(request)
    }

    async fn generate_stream(&self, request: &AssistRequest) -> nudge::Result<EventStream> {
        let chunks = self.chunks.clone().unwrap_or_default();
        let done = self.next_outcome(request)?;
        let events: Vec<nudge::Result<StreamEvent>> = chunks
            .into_iter()
            .map(|c| Ok(StreamEvent::Chunk(c.to_string())))
            .chain(std::iter::once(Ok(StreamEvent::Done(done))))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn supports_streaming(&self) -> bool {
        self.chunks.is_some()
    }

    fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
        self.cost_per_call
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

fn shrink_generation(task: &str, action: &str) -> Generation {
    Generation {
        response: AssistResponse::Shrink(ShrinkResult {
            original_task: task.to_string(),
            steps: vec![ShrinkStep::new(action, 5, Difficulty::Easy)],
            reasoning: None,
            encouragement: None,
        }),
        usage: Usage::new(120, 80),
    }
}

fn default_generation(provider: &str, request: &AssistRequest) -> Generation {
    match request {
        AssistRequest::Shrink(req) => {
            shrink_generation(&req.task_title, &format!("step from {provider}"))
        }
        AssistRequest::Encourage(_) => Generation {
            response: AssistResponse::Encouragement(Encouragement {
                message: format!("{provider} believes in you"),
                tone: Tone::Gentle,
                emoji: None,
            }),
            usage: Usage::new(40, 20),
        },
    }
}

fn first_action(response: &AssistResponse) -> &str {
    match response {
        AssistResponse::Shrink(result) => &result.steps[0].action,
        other => panic!("expected a shrink result, got {other:?}"),
    }
}

fn shrink(task: &str) -> AssistRequest {
    ShrinkRequest::new(task).into()
}

// ============================================================================
// Retry through the queue
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limited_request_is_retried_and_succeeds() {
    let provider = Arc::new(
        Scripted::new("openai")
            .then(Err(NudgeError::RateLimited { retry_after: None }))
            .then(Ok(shrink_generation("write report", "open a blank document"))),
    );
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .concurrency(1)
        .build()
        .unwrap();

    let start = Instant::now();
    let response = orchestrator.request(shrink("write report")).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(first_action(&response), "open a blank document");
    assert_eq!(provider.calls(), 2);
    assert!(elapsed >= Duration::from_secs(1), "waited the base delay");
    assert!(elapsed < Duration::from_secs(2), "only one backoff step");

    let stats = orchestrator.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.total_tokens, 200);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_the_provider_error() {
    let provider = Arc::new(
        Scripted::new("openai")
            .then(Err(NudgeError::Timeout))
            .then(Err(NudgeError::Timeout)),
    );
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .retry(RetryPolicy::new().max_retries(1))
        .build()
        .unwrap();

    let err = orchestrator.request(shrink("call mum")).await.unwrap_err();
    assert!(matches!(err, NudgeError::Timeout));
    assert_eq!(provider.calls(), 2);

    let stats = orchestrator.stats();
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.provider_requests.get("openai"), Some(&1));
}

#[tokio::test]
async fn permanent_errors_fail_fast() {
    let provider = Arc::new(Scripted::new("openai").then(Err(NudgeError::AuthenticationFailed)));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let err = orchestrator.request(shrink("taxes")).await.unwrap_err();
    assert!(matches!(err, NudgeError::AuthenticationFailed));
    assert_eq!(provider.calls(), 1);
}

// ============================================================================
// Provider selection
// ============================================================================

#[tokio::test]
async fn unavailable_primary_falls_through_to_next_provider() {
    let openai = Arc::new(Scripted::new("openai").unavailable());
    let ollama = Arc::new(Scripted::new("ollama"));
    let orchestrator = Orchestrator::builder()
        .provider(openai.clone())
        .provider(ollama.clone())
        .primary("openai")
        .fallback_order(["ollama"])
        .build()
        .unwrap();

    let response = orchestrator.request(shrink("laundry")).await.unwrap();
    assert_eq!(first_action(&response), "step from ollama");
    assert_eq!(openai.calls(), 0);
    assert_eq!(ollama.calls(), 1);
    assert_eq!(orchestrator.stats().provider_requests.get("ollama"), Some(&1));
}

#[tokio::test]
async fn explicit_order_beats_registration_order() {
    let first = Arc::new(Scripted::new("anthropic"));
    let second = Arc::new(Scripted::new("ollama"));
    let orchestrator = Orchestrator::builder()
        .provider(first.clone())
        .provider(second.clone())
        .primary("ollama")
        .build()
        .unwrap();

    orchestrator.request(shrink("dishes")).await.unwrap();
    assert_eq!(first.calls(), 0);
    assert_eq!(second.calls(), 1);
    assert_eq!(orchestrator.providers().order(), vec!["ollama"]);
}

#[tokio::test]
async fn no_available_provider_is_an_error() {
    let orchestrator = Orchestrator::builder()
        .provider(Arc::new(Scripted::new("openai").unavailable()))
        .provider(Arc::new(Scripted::new("ollama").unavailable()))
        .build()
        .unwrap();

    assert!(!orchestrator.is_available().await);
    let err = orchestrator.request(shrink("dentist")).await.unwrap_err();
    assert!(matches!(err, NudgeError::NoProviderAvailable));

    let stats = orchestrator.stats();
    assert_eq!(stats.failed_requests, 1);
    assert!(stats.provider_requests.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_probes_again_and_moves_to_the_next_provider() {
    let primary = Arc::new(
        Scripted::new("a")
            .then(Err(NudgeError::Provider("rate limit exceeded".into())))
            .goes_down_after_first_call(),
    );
    let backup = Arc::new(Scripted::new("b"));
    let orchestrator = Orchestrator::builder()
        .provider(primary.clone())
        .provider(backup.clone())
        .primary("a")
        .fallback_order(["b"])
        .build()
        .unwrap();

    let response = orchestrator.request(shrink("book flights")).await.unwrap();
    assert_eq!(first_action(&response), "step from b");
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 1);

    let stats = orchestrator.stats();
    assert_eq!(stats.provider_requests.get("b"), Some(&1));
    assert_eq!(stats.provider_requests.get("a"), None);
    assert_eq!(orchestrator.cost_tracker().records()[0].provider, "b");
}

#[test]
fn build_rejects_empty_and_unknown_providers() {
    assert!(matches!(
        Orchestrator::builder().build(),
        Err(NudgeError::Configuration(_))
    ));
    assert!(matches!(
        Orchestrator::builder()
            .provider(Arc::new(Scripted::new("openai")))
            .primary("anthropic")
            .build(),
        Err(NudgeError::Configuration(_))
    ));
}

// ============================================================================
// Budget
// ============================================================================

#[tokio::test]
async fn over_budget_request_never_reaches_the_provider() {
    let provider = Arc::new(Scripted::new("openai").cost_per_call(1.0));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .cost_limits(CostLimits::unbounded().per_request(0.5))
        .build()
        .unwrap();

    let err = orchestrator.request(shrink("plan trip")).await.unwrap_err();
    assert!(matches!(err, NudgeError::CostLimitExceeded(_)));
    assert_eq!(provider.calls(), 0);
    assert!(orchestrator.cost_tracker().records().is_empty());
}

#[tokio::test]
async fn shared_tracker_records_real_usage() {
    let tracker = Arc::new(CostTracker::new(CostLimits::unbounded().daily(1.0)));
    let provider = Arc::new(Scripted::new("openai").cost_per_call(0.4));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .cost_tracker(Arc::clone(&tracker))
        .cache_enabled(false)
        .build()
        .unwrap();

    orchestrator.request(shrink("first")).await.unwrap();
    orchestrator.request(shrink("second")).await.unwrap();
    assert!((tracker.daily_usage() - 0.8).abs() < 1e-9);

    // 0.8 + 0.4 would exceed the daily limit
    let err = orchestrator.request(shrink("third")).await.unwrap_err();
    assert!(matches!(err, NudgeError::CostLimitExceeded(_)));
    assert_eq!(provider.calls(), 2);

    let records = tracker.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].input_tokens, 120);
    assert_eq!(records[0].output_tokens, 80);
    assert!(!records[0].cached);
}

#[tokio::test(start_paused = true)]
async fn queued_requests_see_usage_of_the_ones_before_them() {
    let provider = Arc::new(
        Scripted::new("openai")
            .cost_per_call(0.6)
            .latency(Duration::from_millis(100)),
    );
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .cost_limits(CostLimits::unbounded().daily(1.0))
        .concurrency(1)
        .cache_enabled(false)
        .build()
        .unwrap();

    let (first, second, third) = tokio::join!(
        orchestrator.request(shrink("one")),
        orchestrator.request(shrink("two")),
        orchestrator.request(shrink("three")),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(NudgeError::CostLimitExceeded(_))));
    assert!(matches!(third, Err(NudgeError::CostLimitExceeded(_))));
    assert_eq!(provider.calls(), 1);
    assert!((orchestrator.cost_tracker().daily_usage() - 0.6).abs() < 1e-9);
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn similar_shrink_request_is_served_from_cache() {
    let provider = Arc::new(Scripted::new("openai").cost_per_call(0.01));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let first = orchestrator.request(shrink("Clean my room")).await.unwrap();
    let second = orchestrator.request(shrink("clean my room!")).await.unwrap();
    let third = orchestrator.request(shrink("clean my rooms")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(provider.calls(), 1);
    assert_eq!(orchestrator.cost_tracker().records().len(), 1);

    let stats = orchestrator.stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.cached_responses, 2);
    assert!((stats.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn encouragement_cache_is_keyed_on_context_and_mood() {
    let provider = Arc::new(Scripted::new("openai"));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let request = |mood| -> AssistRequest {
        EncouragementRequest::new(EncouragementContext::TaskCompleted)
            .mood(mood)
            .into()
    };

    orchestrator.request(request(Mood::Good)).await.unwrap();
    orchestrator.request(request(Mood::Good)).await.unwrap();
    assert_eq!(provider.calls(), 1);

    orchestrator.request(request(Mood::Low)).await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn fallback_answers_are_not_cached() {
    let provider = Arc::new(Scripted::new("openai").then(Ok(Generation {
        response: AssistResponse::Shrink(ShrinkResult::fallback("file taxes")),
        usage: Usage::new(10, 10),
    })));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    orchestrator.request(shrink("file taxes")).await.unwrap();
    let second = orchestrator.request(shrink("file taxes")).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(first_action(&second), "step from openai");
}

#[tokio::test]
async fn cleared_caches_go_back_to_the_provider() {
    let provider = Arc::new(Scripted::new("openai"));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    orchestrator.request(shrink("water plants")).await.unwrap();
    orchestrator.clear_caches();
    orchestrator.request(shrink("water plants")).await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn disabled_cache_always_calls_the_provider() {
    let provider = Arc::new(Scripted::new("openai"));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .cache_enabled(false)
        .build()
        .unwrap();

    orchestrator.request(shrink("vacuum")).await.unwrap();
    orchestrator.request(shrink("vacuum")).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(orchestrator.stats().cached_responses, 0);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn blank_task_title_is_rejected_before_any_provider_call() {
    let provider = Arc::new(Scripted::new("openai"));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let err = orchestrator.request(shrink("   ")).await.unwrap_err();
    assert!(matches!(err, NudgeError::InvalidInput(_)));
    assert_eq!(provider.calls(), 0);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn streamed_request_forwards_chunks_then_answers() {
    let provider = Arc::new(Scripted::new("openai").streaming(vec!["{\"shrunk", "Tasks\": []}"]));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let response = orchestrator
        .request_streamed(shrink("tidy desk"), tx)
        .await
        .unwrap();
    assert_eq!(first_action(&response), "step from openai");

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    assert_eq!(chunks, vec!["{\"shrunk", "Tasks\": []}"]);
}

#[tokio::test]
async fn non_streaming_provider_answers_without_chunks() {
    let provider = Arc::new(Scripted::new("anthropic"));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    orchestrator
        .request_streamed(shrink("reply to email"), tx)
        .await
        .unwrap();
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn closed_sink_does_not_abort_the_request() {
    let provider = Arc::new(Scripted::new("openai").streaming(vec!["a", "b"]));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    let response = orchestrator.request_streamed(shrink("stretch"), tx).await;
    assert!(response.is_ok());
}

// ============================================================================
// Queue control
// ============================================================================

#[tokio::test]
async fn clear_queue_fails_waiting_requests() {
    let provider = Arc::new(Scripted::new("openai"));
    let orchestrator = Arc::new(
        Orchestrator::builder()
            .provider(provider.clone())
            .concurrency(1)
            .build()
            .unwrap(),
    );
    orchestrator.pause();
    assert!(orchestrator.is_paused());

    let pending = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.request(shrink("book flights")).await })
    };
    while orchestrator.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(orchestrator.clear_queue(), 1);
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, NudgeError::QueueCleared));
    assert_eq!(provider.calls(), 0);

    orchestrator.resume();
    assert!(orchestrator.request(shrink("book flights")).await.is_ok());
}

#[tokio::test]
async fn struggling_requests_jump_the_queue() {
    let provider = Arc::new(Scripted::new("openai"));
    let orchestrator = Arc::new(
        Orchestrator::builder()
            .provider(provider.clone())
            .concurrency(1)
            .cache_enabled(false)
            .build()
            .unwrap(),
    );
    orchestrator.pause();

    let routine = shrink("sort mail");
    let struggling: AssistRequest = ShrinkRequest::new("sort mail")
        .mood(Mood::Overwhelmed)
        .failed_attempts(2)
        .into();

    let mut tasks = Vec::new();
    for request in [routine.clone(), struggling.clone()] {
        let spawned = Arc::clone(&orchestrator);
        tasks.push(tokio::spawn(async move { spawned.request(request).await }));
        // keep submission order deterministic
        let expected = tasks.len();
        while orchestrator.pending_requests() < expected {
            tokio::task::yield_now().await;
        }
    }

    orchestrator.resume();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(*provider.seen.lock().unwrap(), vec![struggling, routine]);
}

#[tokio::test]
async fn without_queue_calls_run_directly() {
    let provider = Arc::new(Scripted::new("openai").then(Err(NudgeError::Timeout)));
    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .queue_enabled(false)
        .build()
        .unwrap();

    assert_eq!(orchestrator.pending_requests(), 0);
    assert_eq!(orchestrator.clear_queue(), 0);
    assert!(matches!(
        orchestrator.request(shrink("nap")).await,
        Err(NudgeError::Timeout)
    ));
    assert_eq!(provider.calls(), 1, "no queue, no retry");
}
