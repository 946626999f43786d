//! Single-job lifecycle controller.
//!
//! `submit` validates and claims the job slot on the caller's task, then runs
//! generate → download → persist on a spawned task. Lifecycle events are sent
//! on an unbounded channel whose receiver belongs to the caller.

use chrono::Utc;
use parking_lot::Mutex;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    artifact::{ArtifactStore, StoredArtifact},
    error::{ErrorDetail, PipelineError, SubmitError},
    imagerouter::ImageRouterClient,
    models::{GenerationEvent, GenerationRequest, GenerationResult, JobHandle, JobSnapshot, JobState},
    transport::HttpTransport,
};

type PipelineOutcome = Result<(String, StoredArtifact), PipelineError>;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub api_base: String,
    pub artifact_dir: PathBuf,
    pub generate_timeout: Duration,
    pub download_timeout: Duration,
}

struct JobSlot {
    state: JobState,
    active: Option<(Uuid, GenerationRequest)>,
    last_result: Option<GenerationResult>,
    last_error: Option<ErrorDetail>,
}

struct Inner<T: HttpTransport> {
    remote: ImageRouterClient<T>,
    store: ArtifactStore<T>,
    slot: Mutex<JobSlot>,
    events: UnboundedSender<GenerationEvent>,
}

pub struct GenerationController<T: HttpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: HttpTransport> Clone for GenerationController<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: HttpTransport> GenerationController<T> {
    /// Builds a controller and the receiving end of its event channel.
    pub fn new(transport: T, options: ControllerOptions) -> (Self, UnboundedReceiver<GenerationEvent>) {
        let transport = Arc::new(transport);
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            remote: ImageRouterClient::new(Arc::clone(&transport), options.api_base)
                .with_timeout(options.generate_timeout),
            store: ArtifactStore::new(transport, options.artifact_dir).with_timeout(options.download_timeout),
            slot: Mutex::new(JobSlot { state: JobState::Idle, active: None, last_result: None, last_error: None }),
            events: tx,
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    /// Starts a job without waiting for it. Fails with `Configuration` outside a tokio runtime.
    pub fn submit(&self, request: GenerationRequest, api_key: &str) -> Result<JobHandle, SubmitError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SubmitError::Configuration("API key is not set".into()));
        }
        if request.prompt().is_empty() {
            return Err(SubmitError::Validation("prompt must not be empty".into()));
        }

        let runtime = Handle::try_current()
            .map_err(|e| SubmitError::Configuration(format!("no async runtime to run the job on: {e}")))?;

        let job_id = Uuid::new_v4();
        let handle = JobHandle { job_id, size: request.size(), submitted_at: Utc::now() };
        {
            let mut slot = self.inner.slot.lock();
            if slot.state == JobState::Running {
                warn!("⛔ Rejecting submit: job {:?} still running", slot.active.as_ref().map(|(id, _)| *id));
                return Err(SubmitError::Busy);
            }
            slot.state = JobState::Running;
            slot.active = Some((job_id, request.clone()));
            self.emit(GenerationEvent::Started { job_id });
        }

        info!("🚀 Job {} started: model={} size={}", job_id, request.model(), handle.size);

        let inner = Arc::clone(&self.inner);
        let api_key = api_key.to_string();
        runtime.spawn(async move {
            let outcome = inner.run_pipeline(&request, &api_key).await;
            inner.finish(job_id, request, outcome);
        });

        Ok(handle)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let slot = self.inner.slot.lock();
        JobSnapshot {
            state: slot.state,
            accepting: slot.state != JobState::Running,
            active_job: slot.active.as_ref().map(|(id, _)| *id),
            active_request: slot.active.as_ref().map(|(_, req)| req.clone()),
            last_result: slot.last_result.clone(),
            last_error: slot.last_error.clone(),
        }
    }

    pub fn last_result(&self) -> Option<GenerationResult> {
        self.inner.slot.lock().last_result.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.slot.lock().state == JobState::Running
    }

    fn emit(&self, event: GenerationEvent) {
        self.inner.emit(event);
    }
}

impl<T: HttpTransport> Inner<T> {
    fn emit(&self, event: GenerationEvent) {
        if self.events.send(event).is_err() {
            warn!("📭 Event receiver dropped; lifecycle event discarded");
        }
    }

    async fn run_pipeline(&self, request: &GenerationRequest, api_key: &str) -> PipelineOutcome {
        let url = self.remote.generate(request, api_key).await?;
        let stored = self.store.fetch_and_store(&url).await?;
        Ok((url, stored))
    }

    /// Records the outcome, sends the terminal event and frees the slot in one critical section.
    fn finish(&self, job_id: Uuid, request: GenerationRequest, outcome: PipelineOutcome) {
        let mut slot = self.slot.lock();
        slot.active = None;
        match outcome {
            Ok((source_url, stored)) => {
                let result = GenerationResult {
                    job_id,
                    path: stored.path,
                    byte_length: stored.byte_length,
                    source_url,
                    request,
                    completed_at: Utc::now(),
                };
                info!("✅ Job {} completed: {} ({} bytes)", job_id, result.path.display(), result.byte_length);
                slot.state = JobState::Completed;
                slot.last_result = Some(result.clone());
                slot.last_error = None;
                self.emit(GenerationEvent::Completed { job_id, result });
            }
            Err(err) => {
                error!("❌ Job {} failed: {}", job_id, err);
                let detail = ErrorDetail::from(err);
                slot.state = JobState::Failed;
                slot.last_error = Some(detail.clone());
                self.emit(GenerationEvent::Failed { job_id, error: detail });
            }
        }
    }
}
