//! Error types for the upload and conversion pipeline.
//!
//! Upload failures are returned to the HTTP caller directly. Pipeline failures
//! happen after the upload response has been sent, so they are logged and
//! recorded in the status tracker where the lookup endpoint can report them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The inbound multipart request could not be used.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The conversion service did not accept the job.
    #[error("failed to submit conversion job for '{file}': {reason}")]
    Submission { file: String, reason: String },

    /// The job never reached a terminal status within the polling budget.
    #[error("conversion job {job_id} did not complete after {attempts} status checks")]
    PollTimeout { job_id: String, attempts: u32 },

    /// The conversion service reported the job as failed.
    #[error("conversion job {job_id} failed: {detail}")]
    ServiceFailure { job_id: String, detail: String },

    /// The converted output could not be downloaded.
    #[error("failed to download converted file from '{uri}': {reason}")]
    Fetch { uri: String, reason: String },

    /// A blob store read or write failed.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_display() {
        let e = PipelineError::PollTimeout {
            job_id: "job-1".into(),
            attempts: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("job-1"), "got: {msg}");
        assert!(msg.contains("5 status checks"), "got: {msg}");
    }

    #[test]
    fn storage_error_keeps_context() {
        let inner = anyhow::anyhow!("disk full").context("writing pdfs/alice.pdf");
        let e = PipelineError::from(inner);
        let msg = e.to_string();
        assert!(msg.contains("pdfs/alice.pdf"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");
    }
}
