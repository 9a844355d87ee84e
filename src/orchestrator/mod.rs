//! The orchestrator: one entry point for every AI-assisted feature.
//!
//! A request goes through, in order:
//!
//! ```text
//! request ──► validate ──► cache? ──hit──► answer (no queue, no cost, no retry)
//!                            │
//!                           miss
//!                            ▼
//!                  queue (priority, retry)
//!                            │  each attempt:
//!                            ▼
//!                  select provider ──none──► NoProviderAvailable
//!                            ▼
//!                  pre-flight budget ──over──► CostLimitExceeded
//!                            ▼
//!                  provider call ──► record usage
//!                            ▼
//!                  cache answer ──► answer
//! ```
//!
//! Selection and the budget check run inside the queued job, once per
//! attempt. A retry re-probes the providers, and every check sees the usage
//! recorded by the jobs that ran before it. The pre-flight check uses fixed
//! per-kind token guesses; the ledger entry uses the real token counts.

mod builder;
mod priority;
mod stats;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::cache::ResponseCache;
use crate::cost::CostTracker;
use crate::providers::{AssistProvider, ProviderChain};
use crate::queue::{Request, RequestQueue};
use crate::telemetry;
use crate::types::{
    AssistRequest, AssistResponse, Encouragement, Generation, RequestKind, ShrinkResult,
    StreamEvent,
};
use crate::{NudgeError, Result};

pub use builder::{OrchestratorBuilder, SHRINK_SIMILARITY_THRESHOLD};
pub use priority::{BASE_PRIORITY, priority_for};
pub use stats::OrchestratorStats;

use stats::StatsRecorder;

/// Routes requests to providers through the cache, budget and queue.
///
/// Build one with [`Orchestrator::builder`] or [`Orchestrator::from_config`]
/// and share it behind an `Arc`.
pub struct Orchestrator {
    chain: Arc<ProviderChain>,
    queue: Option<RequestQueue<AssistRequest, Attempt>>,
    max_retries: u32,
    shrink_cache: Option<ResponseCache<ShrinkResult>>,
    encouragement_cache: Option<ResponseCache<Encouragement>>,
    cost: Arc<CostTracker>,
    stats: StatsRecorder,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Answer a request.
    #[instrument(name = "orchestrator.request", skip_all, fields(kind = request.kind().as_str()))]
    pub async fn request(&self, request: AssistRequest) -> Result<AssistResponse> {
        self.handle(request, None).await
    }

    /// Answer a request, forwarding raw text chunks to `sink` as they arrive.
    ///
    /// Cached answers and providers without streaming support produce no
    /// chunks. Once a chunk has been delivered the job is no longer retried,
    /// so the sink never sees the same text twice. A closed sink does not
    /// abort the request.
    #[instrument(name = "orchestrator.request_streamed", skip_all, fields(kind = request.kind().as_str()))]
    pub async fn request_streamed(
        &self,
        request: AssistRequest,
        sink: mpsc::Sender<String>,
    ) -> Result<AssistResponse> {
        self.handle(request, Some(sink)).await
    }

    /// Whether any configured provider is reachable right now.
    pub async fn is_available(&self) -> bool {
        self.chain.any_available().await
    }

    /// Stop dispatching queued provider calls. In-flight calls finish.
    pub fn pause(&self) {
        if let Some(queue) = &self.queue {
            queue.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(queue) = &self.queue {
            queue.resume();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.queue.as_ref().is_some_and(|q| q.is_paused())
    }

    /// Drop every cached answer.
    pub fn clear_caches(&self) {
        if let Some(cache) = &self.shrink_cache {
            cache.clear();
        }
        if let Some(cache) = &self.encouragement_cache {
            cache.clear();
        }
    }

    /// Fail every queued request with [`NudgeError::QueueCleared`].
    ///
    /// Returns the number of requests cancelled.
    pub fn clear_queue(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.clear())
    }

    /// Provider calls waiting for a slot.
    pub fn pending_requests(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.pending_count())
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats.snapshot()
    }

    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.cost
    }

    pub fn providers(&self) -> &ProviderChain {
        &self.chain
    }

    async fn handle(
        &self,
        request: AssistRequest,
        sink: Option<mpsc::Sender<String>>,
    ) -> Result<AssistResponse> {
        let kind = request.kind();
        if let Err(e) = request.validate() {
            return Err(self.fail(kind, None, e));
        }

        if let Some(hit) = self.cached(&request) {
            debug!("answered from cache");
            self.stats.cached();
            metrics::counter!(telemetry::REQUESTS_TOTAL,
                "kind" => kind.as_str(),
                "status" => "cached",
            )
            .increment(1);
            return Ok(hit);
        }

        let tried = Arc::new(Mutex::new(None));
        let start = Instant::now();
        let execute = executor(
            Arc::clone(&self.chain),
            Arc::clone(&self.cost),
            sink,
            Arc::clone(&tried),
        );
        let outcome = match &self.queue {
            Some(queue) => {
                let priority = priority_for(&request);
                debug!(priority, "queueing provider call");
                queue
                    .submit_request(
                        Request::new(request.clone(), priority, self.max_retries),
                        execute,
                    )
                    .await
            }
            None => execute(request.clone()).await,
        };
        let elapsed = start.elapsed().as_secs_f64();

        let Attempt {
            provider: name,
            generation,
            cost,
        } = match outcome {
            Ok(attempt) => attempt,
            Err(e) => {
                let provider = lock(&tried).clone();
                if let Some(name) = &provider {
                    record_duration(name, kind, elapsed);
                }
                return Err(self.fail(kind, provider.as_deref(), e));
            }
        };
        record_duration(&name, kind, elapsed);

        let usage = generation.usage;
        self.stats.completed(&name, usage, cost);
        record_token_usage(&name, usage.input_tokens, usage.output_tokens);
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "kind" => kind.as_str(),
            "status" => "ok",
        )
        .increment(1);
        debug!(provider = %name, tokens = usage.total(), cost, "request completed");

        self.store(&request, &generation.response);
        Ok(generation.response)
    }

    fn cached(&self, request: &AssistRequest) -> Option<AssistResponse> {
        match request {
            AssistRequest::Shrink(req) => self
                .shrink_cache
                .as_ref()?
                .get_similar(&req.task_title)
                .map(AssistResponse::Shrink),
            AssistRequest::Encourage(req) => self
                .encouragement_cache
                .as_ref()?
                .get(&req.cache_key())
                .map(AssistResponse::Encouragement),
        }
    }

    /// Cache a fresh answer. Fallback answers are not cached.
    fn store(&self, request: &AssistRequest, response: &AssistResponse) {
        match (request, response) {
            (AssistRequest::Shrink(req), AssistResponse::Shrink(result)) => {
                if let Some(cache) = &self.shrink_cache
                    && *result != ShrinkResult::fallback(req.task_title.as_str())
                {
                    cache.set(&req.task_title, result.clone());
                }
            }
            (AssistRequest::Encourage(req), AssistResponse::Encouragement(message)) => {
                if let Some(cache) = &self.encouragement_cache
                    && *message != Encouragement::fallback()
                {
                    cache.set(&req.cache_key(), message.clone());
                }
            }
            _ => {}
        }
    }

    fn fail(&self, kind: RequestKind, provider: Option<&str>, err: NudgeError) -> NudgeError {
        self.stats.failed(provider);
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "kind" => kind.as_str(),
            "status" => "error",
        )
        .increment(1);
        warn!(kind = kind.as_str(), provider, error = %err, "request failed");
        err
    }
}

/// A successful provider call, already written to the ledger.
struct Attempt {
    provider: String,
    generation: Generation,
    cost: f64,
}

/// Name of the provider the latest attempt called, if it got that far.
type TriedSlot = Arc<Mutex<Option<String>>>;

fn lock(slot: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// The job the queue runs for one request. Called once per attempt.
fn executor(
    chain: Arc<ProviderChain>,
    cost: Arc<CostTracker>,
    sink: Option<mpsc::Sender<String>>,
    tried: TriedSlot,
) -> impl Fn(AssistRequest) -> BoxFuture<'static, Result<Attempt>> + Send + Sync + 'static {
    move |request| -> BoxFuture<'static, Result<Attempt>> {
        let chain = Arc::clone(&chain);
        let cost = Arc::clone(&cost);
        let sink = sink.clone();
        let tried = Arc::clone(&tried);
        Box::pin(async move { attempt(&chain, &cost, sink.as_ref(), &tried, &request).await })
    }
}

async fn attempt(
    chain: &ProviderChain,
    cost: &CostTracker,
    sink: Option<&mpsc::Sender<String>>,
    tried: &Mutex<Option<String>>,
    request: &AssistRequest,
) -> Result<Attempt> {
    *lock(tried) = None;
    let provider = chain.select().await?;
    let name = provider.name().to_string();

    let (input, output) = request.kind().placeholder_tokens();
    let estimate = provider.estimate_cost(input, output);
    if !cost.can_proceed(estimate) {
        return Err(NudgeError::CostLimitExceeded(format!(
            "estimated {estimate:.6} for {name} does not fit the budget"
        )));
    }

    *lock(tried) = Some(name.clone());
    let generation = match sink {
        Some(sink) if provider.supports_streaming() => {
            stream_generation(provider.as_ref(), request, sink).await?
        }
        _ => provider.generate(request).await?,
    };

    let usage = generation.usage;
    let spent = provider.estimate_cost(usage.input_tokens, usage.output_tokens);
    cost.record_usage(&name, usage.input_tokens, usage.output_tokens, spent, false);
    Ok(Attempt {
        provider: name,
        generation,
        cost: spent,
    })
}

/// Forward chunks to `sink` and return the final generation.
///
/// Errors before the first delivered chunk pass through untouched so the
/// queue can retry them; later errors become
/// [`NudgeError::StreamInterrupted`], which is never retried.
async fn stream_generation(
    provider: &dyn AssistProvider,
    request: &AssistRequest,
    sink: &mpsc::Sender<String>,
) -> Result<Generation> {
    let mut events = provider.generate_stream(request).await?;
    let mut delivered = 0usize;

    while let Some(event) = events.next().await {
        match event {
            Ok(StreamEvent::Chunk(text)) => {
                if sink.send(text).await.is_ok() {
                    delivered += 1;
                }
            }
            Ok(StreamEvent::Done(generation)) => return Ok(generation),
            Err(e) if delivered == 0 => return Err(e),
            Err(e) => {
                return Err(NudgeError::StreamInterrupted {
                    delivered,
                    message: e.to_string(),
                });
            }
        }
    }

    let message = "stream ended without a result".to_string();
    if delivered == 0 {
        Err(NudgeError::Provider(message))
    } else {
        Err(NudgeError::StreamInterrupted { delivered, message })
    }
}

fn record_duration(provider: &str, kind: RequestKind, seconds: f64) {
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "provider" => provider.to_owned(),
        "kind" => kind.as_str(),
    )
    .record(seconds);
}

fn record_token_usage(provider: &str, input: u32, output: u32) {
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "input",
    )
    .increment(u64::from(input));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "output",
    )
    .increment(u64::from(output));
}
