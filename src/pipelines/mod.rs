use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::conversion::{ConversionService, JobRequest, ServiceCredentials};
use crate::error::PipelineError;
use crate::storage::{Container, StorageBackend};

pub mod poll;
pub mod tracker;

pub use poll::PollPolicy;
pub use tracker::{ConversionState, StatusTracker};

/// Raised whenever a new blob lands in a container.
#[derive(Debug, Clone)]
pub struct BlobCreated {
    pub container: Container,

    /// The blob name within the container.
    pub name: String,

    /// The user the blob was uploaded for, if known.
    pub owner: Option<String>,
}

impl BlobCreated {
    #[inline]
    pub fn pdf_name(&self) -> String {
        crate::utils::pdf_name_for(self.owner.as_deref(), &self.name)
    }
}

pub struct ExecutionResult {
    /// The name the PDF was stored under in the pdf container.
    pub pdf_name: String,

    /// The remote job which produced the PDF.
    pub job_id: String,

    /// The size of the stored PDF in bytes.
    pub size: usize,

    /// The time taken to execute the pipeline.
    pub execution_time: Duration,
}

/// Static settings for submitting jobs.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// The format to convert to.
    pub target: String,

    /// The cloud source type the service reads the input from.
    pub source: String,

    /// The storage account holding the image container.
    pub account_name: String,
}

/// Submits a conversion job for a stored image, waits for it, and stores
/// the resulting PDF.
pub struct ConversionPipeline {
    service: Arc<dyn ConversionService>,
    storage: Arc<dyn StorageBackend>,
    tracker: StatusTracker,
    settings: JobSettings,
    credentials: ServiceCredentials,
    policy: PollPolicy,
    limiter: Option<Arc<Semaphore>>,
}

impl ConversionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: Arc<dyn ConversionService>,
        storage: Arc<dyn StorageBackend>,
        tracker: StatusTracker,
        settings: JobSettings,
        credentials: ServiceCredentials,
        policy: PollPolicy,
        limiter: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            service,
            storage,
            tracker,
            settings,
            credentials,
            policy,
            limiter,
        }
    }

    #[inline]
    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Runs the pipeline on a detached task so the caller never waits
    /// for the conversion.
    pub fn spawn(self: &Arc<Self>, event: BlobCreated) -> JoinHandle<()> {
        let pipeline = self.clone();
        let span = info_span!("conversion", blob = %event.name, pdf = %event.pdf_name());

        tokio::spawn(
            async move {
                match pipeline.run(event).await {
                    Ok(res) => info!(
                        "Stored {} ({} bytes) from job {} in {:?}",
                        res.pdf_name, res.size, res.job_id, res.execution_time,
                    ),
                    Err(e) => error!("Conversion failed: {}", e),
                }
            }
            .instrument(span),
        )
    }

    /// Runs the pipeline to completion and records the outcome.
    pub async fn run(&self, event: BlobCreated) -> Result<ExecutionResult, PipelineError> {
        let pdf_name = event.pdf_name();
        self.tracker.record(&pdf_name, ConversionState::Submitting);

        let _permit = match self.limiter.as_ref() {
            Some(limiter) => {
                let permit = limiter.clone().acquire_owned().await.ok();

                // Refreshes the entry's time to live after queueing.
                self.tracker.record(&pdf_name, ConversionState::Submitting);
                permit
            },
            None => None,
        };

        let instant = Instant::now();
        let result = self.execute(&event, &pdf_name).await;

        let state = match &result {
            Ok(_) => ConversionState::Done,
            Err(PipelineError::PollTimeout { attempts, .. }) => ConversionState::TimedOut {
                attempts: *attempts,
            },
            Err(other) => ConversionState::Failed {
                detail: other.to_string(),
            },
        };
        self.tracker.record(&pdf_name, state);

        result.map(|(job_id, size)| ExecutionResult {
            pdf_name,
            job_id,
            size,
            execution_time: instant.elapsed(),
        })
    }

    async fn execute(
        &self,
        event: &BlobCreated,
        pdf_name: &str,
    ) -> Result<(String, usize), PipelineError> {
        let request = JobRequest::for_blob(
            &self.settings.target,
            &self.settings.source,
            event.container.as_ref(),
            &event.name,
            &self.settings.account_name,
            &self.credentials.account_key,
        );

        let job = self.service.submit(&request).await?;
        info!("Submitted job {} for {}/{}", job.id, event.container, event.name);

        let job = poll::poll_until_terminal(
            self.service.as_ref(),
            &job.id,
            self.policy,
            |attempts| {
                self.tracker.record(pdf_name, ConversionState::AwaitingCompletion {
                    job_id: job.id.clone(),
                    attempts,
                })
            },
        )
        .await?;

        let output = job.outputs.first().ok_or_else(|| PipelineError::ServiceFailure {
            job_id: job.id.clone(),
            detail: "job completed without any output".to_string(),
        })?;
        debug!("Job {} produced {} @ {}", job.id, output.filename, output.uri);

        self.tracker.record(pdf_name, ConversionState::Fetching);
        let data = self.service.download(&output.uri).await?;
        let size = data.len();

        self.storage.store(Container::Pdfs, pdf_name, data).await?;

        Ok((job.id, size))
    }
}
