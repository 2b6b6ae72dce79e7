use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

/// The request body used to create a conversion job.
///
/// ```json
/// {
///     "conversion": [{ "target": "pdf" }],
///     "input": [{
///         "type": "cloud",
///         "source": "azure",
///         "parameters": { "container": "images", "file": "cat.png" },
///         "credentials": { "accountname": "...", "accountkey": "..." }
///     }]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub conversion: Vec<ConversionTarget>,
    pub input: Vec<JobInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionTarget {
    pub target: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub parameters: InputParameters,
    pub credentials: InputCredentials,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputParameters {
    pub container: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputCredentials {
    pub accountname: String,
    pub accountkey: String,
}

impl JobRequest {
    /// A job converting a blob held in the given cloud storage container.
    pub fn for_blob(
        target: &str,
        source: &str,
        container: &str,
        file: &str,
        account_name: &str,
        account_key: &str,
    ) -> Self {
        Self {
            conversion: vec![ConversionTarget { target: target.to_string() }],
            input: vec![JobInput {
                kind: "cloud".to_string(),
                source: source.to_string(),
                parameters: InputParameters {
                    container: container.to_string(),
                    file: file.to_string(),
                },
                credentials: InputCredentials {
                    accountname: account_name.to_string(),
                    accountkey: account_key.to_string(),
                },
            }],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Maps the service's status code onto the four states we act on.
    ///
    /// Unknown codes are treated as still processing, the poll budget
    /// bounds how long that can last.
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "failed" | "invalid" | "canceled" | "cancelled" => Self::Failed,
            "queued" | "incomplete" | "ready" => Self::Queued,
            _ => Self::Processing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobOutput {
    pub uri: String,
    pub filename: String,
}

/// A snapshot of a remote job.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: String,
    pub status: JobStatus,
    pub outputs: Vec<JobOutput>,

    /// The service's explanation when the job failed.
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawJob {
    pub id: Option<String>,
    pub status: Option<RawStatus>,
    #[serde(default)]
    pub output: Vec<JobOutput>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStatus {
    pub code: String,
    pub info: Option<String>,
}

impl RawJob {
    /// Converts the wire format, falling back to `id` when the body
    /// does not repeat it.
    pub fn into_job(self, id: &str) -> ConversionJob {
        let status = self
            .status
            .as_ref()
            .map(|s| JobStatus::from_code(&s.code))
            .unwrap_or(JobStatus::Queued);

        let detail = if status == JobStatus::Failed {
            let mut parts: Vec<String> = self
                .status
                .as_ref()
                .and_then(|s| s.info.clone())
                .into_iter()
                .collect();
            parts.extend(self.errors.iter().map(describe_error));

            if parts.is_empty() {
                Some("no detail given by the conversion service".to_string())
            } else {
                Some(parts.join("; "))
            }
        } else {
            None
        };

        ConversionJob {
            id: self.id.unwrap_or_else(|| id.to_string()),
            status,
            outputs: self.output,
            detail,
        }
    }
}

fn describe_error(err: &Value) -> String {
    err.get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_request_wire_format() {
        let req = JobRequest::for_blob("pdf", "azure", "images", "cat.png", "account", "secret");
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["conversion"][0]["target"], "pdf");
        assert_eq!(value["input"][0]["type"], "cloud");
        assert_eq!(value["input"][0]["source"], "azure");
        assert_eq!(value["input"][0]["parameters"]["container"], "images");
        assert_eq!(value["input"][0]["parameters"]["file"], "cat.png");
        assert_eq!(value["input"][0]["credentials"]["accountname"], "account");
        assert_eq!(value["input"][0]["credentials"]["accountkey"], "secret");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(JobStatus::from_code("completed"), JobStatus::Completed);
        assert_eq!(JobStatus::from_code("failed"), JobStatus::Failed);
        assert_eq!(JobStatus::from_code("invalid"), JobStatus::Failed);
        assert_eq!(JobStatus::from_code("queued"), JobStatus::Queued);
        assert_eq!(JobStatus::from_code("downloading"), JobStatus::Processing);
        assert_eq!(JobStatus::from_code("processing"), JobStatus::Processing);
    }

    #[test]
    fn test_completed_job_outputs() {
        let raw: RawJob = serde_json::from_value(serde_json::json!({
            "id": "job-1",
            "status": { "code": "completed", "info": "The file has been converted" },
            "output": [{ "uri": "https://example.com/dl/cat.pdf", "filename": "cat.pdf" }],
        }))
        .unwrap();

        let job = raw.into_job("job-1");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.outputs[0].filename, "cat.pdf");
        assert!(job.detail.is_none());
    }

    #[test]
    fn test_failed_job_collects_detail() {
        let raw: RawJob = serde_json::from_value(serde_json::json!({
            "status": { "code": "failed", "info": "conversion failed" },
            "errors": [{ "source": "input", "message": "file not found" }],
        }))
        .unwrap();

        let job = raw.into_job("job-2");
        assert_eq!(job.id, "job-2");
        assert_eq!(job.status, JobStatus::Failed);
        let detail = job.detail.unwrap();
        assert!(detail.contains("conversion failed"), "got: {detail}");
        assert!(detail.contains("file not found"), "got: {detail}");
    }
}
