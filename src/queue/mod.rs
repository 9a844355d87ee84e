//! Priority request queue with bounded concurrency and automatic retry.
//!
//! Jobs are kept in a single ordered list. A new job is inserted before the
//! first job with a strictly lower priority, so equal priorities stay FIFO.
//! The dispatcher pulls from the front while fewer than `concurrency` jobs
//! are running and the queue is not paused.
//!
//! # Job lifecycle
//!
//! ```text
//! queued ──► running ──► succeeded
//!   ▲           │
//!   │           ├──► failed          (permanent error or retries exhausted)
//!   │           ▼
//!   └──── retry-delayed              (transient error, backoff elapsed)
//! ```
//!
//! A retried job goes back to the *front* of the list once its backoff has
//! elapsed, ahead of everything still waiting. That can let a retried
//! low-priority job run before a never-tried higher-priority one; finishing
//! work already in flight is preferred over strict priority order.
//!
//! When retries are exhausted the caller receives the original error from
//! the last attempt.

pub mod retry;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{NudgeError, Result};

pub use retry::RetryPolicy;

/// Default number of jobs allowed to run at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum jobs running at once. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Retry policy applied to every job unless overridden per request.
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

/// A unit of work as the queue sees it.
#[derive(Debug, Clone)]
pub struct Request<P> {
    pub payload: P,
    /// Higher runs sooner.
    pub priority: u32,
    pub submitted_at: Instant,
    /// Retries performed so far.
    pub retries: u32,
    /// Retry ceiling for this request.
    pub max_retries: u32,
}

impl<P> Request<P> {
    pub fn new(payload: P, priority: u32, max_retries: u32) -> Self {
        Self {
            payload,
            priority,
            submitted_at: Instant::now(),
            retries: 0,
            max_retries,
        }
    }
}

type Executor<P, T> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct QueuedJob<P, T> {
    request: Request<P>,
    executor: Executor<P, T>,
    done: oneshot::Sender<Result<T>>,
}

struct QueueState<P, T> {
    jobs: VecDeque<QueuedJob<P, T>>,
    running: usize,
    paused: bool,
}

struct Shared<P, T> {
    config: QueueConfig,
    state: Mutex<QueueState<P, T>>,
}

/// Completion handle for a submitted job.
///
/// Resolves to the job's final result. Dropping the handle before the job
/// starts lets the dispatcher skip it.
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(NudgeError::QueueClosed)))
    }
}

/// Priority-ordered admission and execution pipeline.
///
/// Cheap to clone; clones share the same job list.
///
/// Spawns onto the current tokio runtime: [`submit`](Self::submit),
/// [`enqueue`](Self::enqueue) and [`resume`](Self::resume) must be called
/// from within one.
pub struct RequestQueue<P, T> {
    shared: Arc<Shared<P, T>>,
}

impl<P, T> Clone for RequestQueue<P, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, T> RequestQueue<P, T>
where
    P: Clone + Send + 'static,
    T: Send + 'static,
{
    pub fn new(config: QueueConfig) -> Self {
        let config = QueueConfig {
            concurrency: config.concurrency.max(1),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    running: 0,
                    paused: false,
                }),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Submit a job and wait for its final result.
    pub async fn enqueue<F, Fut>(&self, payload: P, executor: F, priority: u32) -> Result<T>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.submit(payload, executor, priority).await
    }

    /// Submit a job with the queue's default retry ceiling.
    ///
    /// The job is in the list when this returns; await the handle for the
    /// result.
    pub fn submit<F, Fut>(&self, payload: P, executor: F, priority: u32) -> JobHandle<T>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let request = Request::new(payload, priority, self.shared.config.retry.max_retries);
        self.submit_request(request, executor)
    }

    /// Submit a fully specified request, e.g. with a custom retry ceiling.
    pub fn submit_request<F, Fut>(&self, request: Request<P>, executor: F) -> JobHandle<T>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let executor: Executor<P, T> =
            Arc::new(move |payload| -> BoxFuture<'static, Result<T>> {
                Box::pin(executor(payload))
            });
        let (done, rx) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            let position = state
                .jobs
                .iter()
                .position(|job| job.request.priority < request.priority)
                .unwrap_or(state.jobs.len());
            debug!(
                priority = request.priority,
                position,
                pending = state.jobs.len(),
                "job queued"
            );
            state.jobs.insert(
                position,
                QueuedJob {
                    request,
                    executor,
                    done,
                },
            );
        }
        self.shared.dispatch();
        JobHandle { rx }
    }

    /// Stop dispatching new jobs. Running jobs are unaffected.
    pub fn pause(&self) {
        self.shared.lock().paused = true;
    }

    /// Resume dispatching.
    pub fn resume(&self) {
        self.shared.lock().paused = false;
        self.shared.dispatch();
    }

    /// Fail every pending job with [`NudgeError::QueueCleared`].
    ///
    /// Running jobs, and jobs waiting out a retry backoff, are not affected.
    /// Returns the number of jobs cancelled.
    pub fn clear(&self) -> usize {
        let cancelled: Vec<_> = self.shared.lock().jobs.drain(..).collect();
        let count = cancelled.len();
        for job in cancelled {
            let _ = job.done.send(Err(NudgeError::QueueCleared));
        }
        if count > 0 {
            metrics::counter!(telemetry::JOBS_SETTLED_TOTAL, "status" => "cleared")
                .increment(count as u64);
            debug!(count, "queue cleared");
        }
        count
    }

    /// Jobs waiting to run.
    pub fn pending_count(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    /// Jobs currently executing.
    pub fn running_count(&self) -> usize {
        self.shared.lock().running
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }
}

impl<P, T> Shared<P, T>
where
    P: Clone + Send + 'static,
    T: Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<P, T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start jobs from the front until the concurrency limit is reached.
    fn dispatch(self: &Arc<Self>) {
        loop {
            let job = {
                let mut state = self.lock();
                if state.paused || state.running >= self.config.concurrency {
                    return;
                }
                let Some(job) = state.jobs.pop_front() else {
                    return;
                };
                if job.done.is_closed() {
                    debug!("caller went away, dropping job");
                    continue;
                }
                state.running += 1;
                job
            };
            let shared = Arc::clone(self);
            tokio::spawn(async move { shared.run(job).await });
        }
    }

    async fn run(self: Arc<Self>, job: QueuedJob<P, T>) {
        let QueuedJob {
            mut request,
            executor,
            done,
        } = job;

        debug!(
            priority = request.priority,
            retries = request.retries,
            waited_ms = request.submitted_at.elapsed().as_millis() as u64,
            "job started"
        );
        let outcome = executor(request.payload.clone()).await;

        self.lock().running -= 1;
        self.dispatch();

        match outcome {
            Ok(value) => {
                metrics::counter!(telemetry::JOBS_SETTLED_TOTAL, "status" => "ok").increment(1);
                let _ = done.send(Ok(value));
            }
            Err(err) if request.retries < request.max_retries && err.is_transient() => {
                request.retries += 1;
                let delay = self
                    .config
                    .retry
                    .effective_delay(request.retries, err.retry_after());
                metrics::counter!(telemetry::RETRIES_TOTAL).increment(1);
                warn!(
                    retry = request.retries,
                    max_retries = request.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;

                self.lock().jobs.push_front(QueuedJob {
                    request,
                    executor,
                    done,
                });
                self.dispatch();
            }
            Err(err) => {
                debug!(retries = request.retries, error = %err, "job failed");
                metrics::counter!(telemetry::JOBS_SETTLED_TOTAL, "status" => "error").increment(1);
                let _ = done.send(Err(err));
            }
        }
    }
}
