use std::time::Duration;

use crate::conversion::{ConversionJob, ConversionService, JobStatus};
use crate::error::PipelineError;

/// How often and how many times a job's status is checked.
///
/// The longest a job can be waited on is roughly
/// `interval * (max_attempts - 1)` plus the request times.
#[derive(Debug, Copy, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Checks the job until it completes, fails or the attempt budget runs out.
///
/// Status checks that fail in transit use up an attempt like any other.
/// `on_attempt` is called with the attempt number before each check.
pub async fn poll_until_terminal<F>(
    service: &dyn ConversionService,
    job_id: &str,
    policy: PollPolicy,
    mut on_attempt: F,
) -> Result<ConversionJob, PipelineError>
where
    F: FnMut(u32),
{
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.interval).await;
        }

        on_attempt(attempt);

        let job = match service.status(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    "Status check {}/{} for job {} failed: {:#}",
                    attempt, policy.max_attempts, job_id, e,
                );
                continue;
            },
        };

        debug!("Job {} is {} (check {}/{})", job_id, job.status, attempt, policy.max_attempts);
        match job.status {
            JobStatus::Completed => return Ok(job),
            JobStatus::Failed => {
                return Err(PipelineError::ServiceFailure {
                    job_id: job_id.to_string(),
                    detail: job
                        .detail
                        .unwrap_or_else(|| "no detail given by the conversion service".to_string()),
                })
            },
            JobStatus::Queued | JobStatus::Processing => {},
        }
    }

    Err(PipelineError::PollTimeout {
        job_id: job_id.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::conversion::{JobOutput, JobRequest};

    /// Replays a fixed sequence of status results, repeating the last one.
    struct ScriptedService {
        script: Mutex<VecDeque<Option<JobStatus>>>,
        checks: Mutex<u32>,
    }

    impl ScriptedService {
        fn new(script: Vec<Option<JobStatus>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                checks: Mutex::new(0),
            }
        }

        fn checks(&self) -> u32 {
            *self.checks.lock().unwrap()
        }
    }

    #[async_trait]
    impl ConversionService for ScriptedService {
        async fn submit(&self, _request: &JobRequest) -> Result<ConversionJob, PipelineError> {
            unreachable!("polling never submits")
        }

        async fn status(&self, job_id: &str) -> anyhow::Result<ConversionJob> {
            *self.checks.lock().unwrap() += 1;

            let next = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    *script.front().unwrap()
                }
            };

            let status = next.ok_or_else(|| anyhow!("connection reset"))?;
            Ok(ConversionJob {
                id: job_id.to_string(),
                status,
                outputs: vec![JobOutput {
                    uri: "https://example.com/cat.pdf".into(),
                    filename: "cat.pdf".into(),
                }],
                detail: (status == JobStatus::Failed).then(|| "unsupported file".to_string()),
            })
        }

        async fn download(&self, _uri: &str) -> Result<Bytes, PipelineError> {
            unreachable!("polling never downloads")
        }
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_completes_after_processing() {
        let service = ScriptedService::new(vec![
            Some(JobStatus::Queued),
            Some(JobStatus::Processing),
            Some(JobStatus::Completed),
        ]);

        let mut seen = Vec::new();
        let job = poll_until_terminal(&service, "job-1", policy(10), |n| seen.push(n))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(service.checks(), 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_never_completing_job_times_out() {
        let service = ScriptedService::new(vec![Some(JobStatus::Processing)]);

        let res = poll_until_terminal(&service, "job-2", policy(5), |_| {}).await;
        assert!(matches!(res, Err(PipelineError::PollTimeout { attempts: 5, .. })));
        assert_eq!(service.checks(), 5);
    }

    #[tokio::test]
    async fn test_failed_job_stops_polling() {
        let service = ScriptedService::new(vec![
            Some(JobStatus::Processing),
            Some(JobStatus::Failed),
        ]);

        let res = poll_until_terminal(&service, "job-3", policy(10), |_| {}).await;
        match res {
            Err(PipelineError::ServiceFailure { job_id, detail }) => {
                assert_eq!(job_id, "job-3");
                assert_eq!(detail, "unsupported file");
            },
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(service.checks(), 2);
    }

    #[tokio::test]
    async fn test_transport_errors_use_up_attempts() {
        let service = ScriptedService::new(vec![None]);

        let res = poll_until_terminal(&service, "job-4", policy(3), |_| {}).await;
        assert!(matches!(res, Err(PipelineError::PollTimeout { attempts: 3, .. })));
        assert_eq!(service.checks(), 3);
    }

    #[tokio::test]
    async fn test_recovers_from_transient_error() {
        let service = ScriptedService::new(vec![None, Some(JobStatus::Completed)]);

        let job = poll_until_terminal(&service, "job-5", policy(3), |_| {}).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
