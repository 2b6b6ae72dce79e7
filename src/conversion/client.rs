use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

use crate::conversion::job::RawJob;
use crate::conversion::{ConversionJob, JobRequest};
use crate::error::PipelineError;

const API_KEY_HEADER: &str = "x-oc-api-key";

/// A remote, job based conversion API.
#[async_trait]
pub trait ConversionService: Sync + Send + 'static {
    /// Creates a job, the returned snapshot always carries the job id.
    async fn submit(&self, request: &JobRequest) -> Result<ConversionJob, PipelineError>;

    /// Reads the current state of a job.
    ///
    /// Errors here are transport level problems, a job the service reports
    /// as failed is returned as `Ok` with a failed status.
    async fn status(&self, job_id: &str) -> anyhow::Result<ConversionJob>;

    /// Fetches a finished output file from the URI the job reported.
    async fn download(&self, uri: &str) -> Result<Bytes, PipelineError>;
}

/// Secrets injected at process start.
#[derive(Clone)]
pub struct ServiceCredentials {
    /// Sent with every request to the conversion API.
    pub api_key: String,

    /// Lets the conversion service read the source container.
    pub account_key: String,
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("api_key", &"<redacted>")
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Talks to an online-convert style `/jobs` API.
pub struct OnlineConvertClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OnlineConvertClient {
    pub fn new(endpoint: &str, credentials: &ServiceCredentials, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
        })
    }

    #[inline]
    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.endpoint)
    }
}

#[async_trait]
impl ConversionService for OnlineConvertClient {
    async fn submit(&self, request: &JobRequest) -> Result<ConversionJob, PipelineError> {
        let file = request
            .input
            .first()
            .map(|input| input.parameters.file.clone())
            .unwrap_or_default();
        let submission_error = |reason: String| PipelineError::Submission {
            file: file.clone(),
            reason,
        };

        let resp = self
            .http
            .post(self.jobs_url())
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .json(request)
            .send()
            .await
            .map_err(|e| submission_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(submission_error(format!("service responded with {}: {}", status, body)));
        }

        let raw: RawJob = resp
            .json()
            .await
            .map_err(|e| submission_error(format!("unreadable response: {}", e)))?;

        let id = match raw.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(submission_error("response did not contain a job id".to_string())),
        };

        Ok(raw.into_job(&id))
    }

    async fn status(&self, job_id: &str) -> anyhow::Result<ConversionJob> {
        let resp = self
            .http
            .get(format!("{}/{}", self.jobs_url(), job_id))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("status check for job {} responded with {}", job_id, status));
        }

        let raw: RawJob = resp.json().await?;
        Ok(raw.into_job(job_id))
    }

    async fn download(&self, uri: &str) -> Result<Bytes, PipelineError> {
        let fetch_error = |reason: String| PipelineError::Fetch {
            uri: uri.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", resp.status())));
        }

        resp.bytes().await.map_err(|e| fetch_error(e.to_string()))
    }
}
