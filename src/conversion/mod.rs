mod client;
mod job;

pub use client::{ConversionService, OnlineConvertClient, ServiceCredentials};
pub use job::{ConversionJob, JobRequest, JobStatus};
#[cfg(test)]
pub use job::JobOutput;
