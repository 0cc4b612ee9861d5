/// External job poller
///
/// Submits a job once, then polls it on a fixed interval until it reaches a
/// terminal status or the poll budget runs out.
///
/// # Poll Budget
///
/// Polls are counted after the submission. A job still running after exactly
/// `max_polls` polls fails with [`JobError::TimedOut`]. A job that is already
/// terminal when submitted is never polled.
///
/// # Background Execution
///
/// [`JobPoller::spawn`] runs the loop on a Tokio task and returns a
/// [`JobHandle`]. Cancelling the handle, or dropping it before the job
/// finishes, interrupts the wait between polls, asks the provider to cancel
/// the job and resolves the task with [`JobError::Cancelled`]. An HTTP
/// handler that awaits the handle therefore stops polling when its client
/// disconnects.
///
/// # Example
///
/// ```no_run
/// use printstudio_worker::poller::{JobPoller, PollerConfig};
/// use printstudio_worker::providers::{ImageInput, InferenceProvider, JobRequest};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example(provider: Arc<dyn InferenceProvider>) -> Result<(), Box<dyn std::error::Error>> {
/// let poller = JobPoller::new(PollerConfig {
///     poll_interval: Duration::from_secs(1),
///     max_polls: 120,
/// });
///
/// let request = JobRequest::new("ndreca/hunyuan3d-2", "image", ImageInput::new(vec![0u8], "image/png"));
/// let handle = poller.spawn(provider, request, &["model_file", "glb", "output_model", "mesh"]);
///
/// // If the caller goes away, dropping `handle` cancels the job.
/// let result = handle.wait().await?;
/// println!("{} after {} polls", result.output_url, result.polls);
/// # Ok(())
/// # }
/// ```

use crate::output::JobOutput;
use crate::providers::{ExternalJob, InferenceProvider, JobRequest, JobStatus, ProviderError};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Default wait between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default poll budget
pub const DEFAULT_MAX_POLLS: u32 = 60;

/// Poller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// Job error types
///
/// Errors are terminal; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to submit job: {0}")]
    Submit(#[source] ProviderError),

    #[error("Failed to poll job {job_id}: {source}")]
    Poll {
        job_id: String,
        #[source]
        source: ProviderError,
    },

    /// Provider reported failure or cancellation
    #[error("{0}")]
    Failed(String),

    #[error("Job timed out after {polls} polls")]
    TimedOut { job_id: String, polls: u32 },

    /// Job succeeded without a usable output URL
    #[error("Job {job_id} returned no usable output")]
    MissingOutput { job_id: String },

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job task panicked: {0}")]
    Panicked(String),
}

/// Successful job
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: String,

    /// Normalized output URL (http(s) or data URL)
    pub output_url: String,

    /// Output as returned by the provider
    pub raw_output: JsonValue,

    /// Polls performed after submission
    pub polls: u32,

    pub elapsed: Duration,
}

/// Submit-then-poll runner
#[derive(Debug, Clone, Copy, Default)]
pub struct JobPoller {
    config: PollerConfig,
}

impl JobPoller {
    pub fn new(config: PollerConfig) -> Self {
        JobPoller { config }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Same poller with another poll budget
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.config.max_polls = max_polls;
        self
    }

    /// Runs a job on a background task
    pub fn spawn(
        &self,
        provider: Arc<dyn InferenceProvider>,
        request: JobRequest,
        output_keys: &'static [&'static str],
    ) -> JobHandle {
        let token = CancellationToken::new();
        let poller = *self;
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            poller
                .run(provider.as_ref(), &request, output_keys, &task_token)
                .await
        });

        JobHandle {
            task,
            guard: token.clone().drop_guard(),
            token,
        }
    }

    /// Runs a job to completion on the current task
    pub async fn run(
        &self,
        provider: &dyn InferenceProvider,
        request: &JobRequest,
        output_keys: &[&str],
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        let started = Instant::now();

        let mut job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            submitted = provider.submit(request) => submitted.map_err(JobError::Submit)?,
        };
        let job_id = job.id.clone();

        tracing::debug!(
            provider = provider.name(),
            job_id = %job_id,
            status = %job.status,
            max_polls = self.config.max_polls,
            "Job submitted"
        );

        let mut polls: u32 = 0;
        while !job.status.is_terminal() {
            if polls >= self.config.max_polls {
                tracing::warn!(
                    provider = provider.name(),
                    job_id = %job_id,
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job timed out"
                );
                cancel_remote(provider, &job_id).await;
                return Err(JobError::TimedOut { job_id, polls });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %job_id, polls, "Job cancelled by caller");
                    cancel_remote(provider, &job_id).await;
                    return Err(JobError::Cancelled);
                }
                _ = sleep(self.config.poll_interval) => {}
            }

            job = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancel_remote(provider, &job_id).await;
                    return Err(JobError::Cancelled);
                }
                polled = provider.poll(&job_id) => polled.map_err(|source| JobError::Poll {
                    job_id: job_id.clone(),
                    source,
                })?,
            };
            polls += 1;

            tracing::trace!(job_id = %job_id, polls, status = %job.status, "Job polled");
        }

        finish(job, polls, started.elapsed(), output_keys)
    }
}

/// Converts a terminal job into the call result
fn finish(
    job: ExternalJob,
    polls: u32,
    elapsed: Duration,
    output_keys: &[&str],
) -> Result<JobResult, JobError> {
    match job.status {
        JobStatus::Succeeded => {
            let raw_output = job.output.unwrap_or(JsonValue::Null);
            let output_url = JobOutput::from_value(raw_output.clone())
                .and_then(|output| output.extract_url(output_keys))
                .ok_or_else(|| JobError::MissingOutput {
                    job_id: job.id.clone(),
                })?;

            tracing::info!(
                job_id = %job.id,
                polls,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job succeeded"
            );

            Ok(JobResult {
                job_id: job.id,
                output_url,
                raw_output,
                polls,
                elapsed,
            })
        }
        _ => {
            let message = job
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| format!("Job {}", job.status));

            tracing::warn!(job_id = %job.id, status = %job.status, error = %message, "Job failed");
            Err(JobError::Failed(message))
        }
    }
}

/// Best-effort provider-side cancellation
async fn cancel_remote(provider: &dyn InferenceProvider, job_id: &str) {
    if let Err(e) = provider.cancel(job_id).await {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to cancel provider job");
    }
}

/// Handle to a spawned job
///
/// Dropping the handle before the job finishes cancels it.
pub struct JobHandle {
    task: JoinHandle<Result<JobResult, JobError>>,
    token: CancellationToken,
    guard: DropGuard,
}

impl JobHandle {
    /// Requests cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for the job
    ///
    /// Dropping this future before it completes cancels the job as well.
    pub async fn wait(self) -> Result<JobResult, JobError> {
        let JobHandle { task, guard, .. } = self;
        let joined = task.await;
        let _ = guard.disarm();

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(JobError::Cancelled),
            Err(e) => Err(JobError::Panicked(e.to_string())),
        }
    }
}
