/// Mock provider for testing
///
/// Plays back a scripted status sequence:
///
/// - `submit` returns a job in the first scripted status
/// - the n-th `poll` returns the (n+1)-th status; the last status repeats
///   once the script is exhausted
///
/// Succeeded jobs carry the configured output and failed ones the configured
/// error. Calls are counted so tests can assert on polling behavior.
///
/// # Example
///
/// ```
/// use printstudio_worker::providers::{JobStatus, MockProvider};
///
/// let provider = MockProvider::new(vec![
///     JobStatus::Queued,
///     JobStatus::Processing,
///     JobStatus::Succeeded,
/// ])
/// .with_output(serde_json::json!(["https://example.com/out.png"]));
///
/// assert_eq!(provider.poll_count(), 0);
/// ```

use super::{ExternalJob, InferenceProvider, JobRequest, JobStatus, ProviderError};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const MOCK_JOB_ID: &str = "mock-job-1";

/// Scripted provider
pub struct MockProvider {
    script: Vec<JobStatus>,
    output: Option<JsonValue>,
    error: Option<String>,
    submit_error: Option<String>,
    submits: AtomicUsize,
    polls: AtomicUsize,
    cancels: AtomicUsize,
    last_request: Mutex<Option<JobRequest>>,
}

impl MockProvider {
    /// Creates a provider playing back `script`
    ///
    /// An empty script behaves like `[Succeeded]`.
    pub fn new(script: Vec<JobStatus>) -> Self {
        let script = if script.is_empty() {
            vec![JobStatus::Succeeded]
        } else {
            script
        };

        MockProvider {
            script,
            output: None,
            error: None,
            submit_error: None,
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Provider whose jobs succeed on submission with `output`
    pub fn succeeding(output: JsonValue) -> Self {
        Self::new(vec![JobStatus::Succeeded]).with_output(output)
    }

    /// Provider whose jobs never leave `processing`
    pub fn stuck() -> Self {
        Self::new(vec![JobStatus::Processing])
    }

    pub fn with_output(mut self, output: JsonValue) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Makes `submit` fail with a 502 carrying `message`
    pub fn failing_submit(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Last submitted request
    pub fn last_request(&self) -> Option<JobRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn job_at(&self, step: usize) -> ExternalJob {
        let status = self.script[step.min(self.script.len() - 1)];
        let mut job = ExternalJob::new(MOCK_JOB_ID, status);

        match status {
            JobStatus::Succeeded => job.output = self.output.clone(),
            JobStatus::Failed | JobStatus::Canceled => job.error = self.error.clone(),
            _ => {}
        }

        job
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &JobRequest) -> Result<ExternalJob, ProviderError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.clone());

        if let Some(message) = &self.submit_error {
            return Err(ProviderError::Api {
                status: 502,
                message: message.clone(),
            });
        }

        Ok(self.job_at(0))
    }

    async fn poll(&self, _job_id: &str) -> Result<ExternalJob, ProviderError> {
        let step = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.job_at(step))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ProviderError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(job_id = %job_id, "Mock job cancelled");
        Ok(())
    }
}
