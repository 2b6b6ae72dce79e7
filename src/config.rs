use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::storage::backends::BackendConfigs;

static CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

pub fn config() -> &'static RuntimeConfig {
    CONFIG.get().expect("config init")
}

pub async fn init(config_file: &Path) -> Result<()> {
    let file = tokio::fs::read(config_file).await?;

    if let Some(ext) = config_file.extension() {
        let ext = ext.to_string_lossy().to_string();
        let cfg: RuntimeConfig = match ext.as_str() {
            "json" => serde_json::from_slice(&file)?,
            "yaml" => serde_yaml::from_slice(&file)?,
            "yml" => serde_yaml::from_slice(&file)?,
            _ => return Err(anyhow!("Config file must have an extension of either `.json`,`.yaml` or `.yml`"))
        };

        cfg.validate()?;
        let _ = CONFIG.set(cfg);
        Ok(())
    } else {
        Err(anyhow!("Config file must have an extension of either `.json` or `.yaml`"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// The set storage backend configuration.
    pub backend: BackendConfigs,

    /// The remote conversion service.
    pub conversion: ConversionConfig,

    /// The storage account the conversion service pulls source images from.
    ///
    /// The account key is never read from this file, it is injected at startup.
    pub storage_account: StorageAccountConfig,

    #[serde(default)]
    /// The base URL used to build `downloadUri` values for finished PDFs.
    ///
    /// The PDF name is appended as the final path segment. Defaults to the
    /// service's own `/api/pdfs` route.
    pub download_base_url: Option<String>,

    #[serde(default = "default_status_retention")]
    /// How long, in seconds, the outcome of a conversion is remembered
    /// for lookups.
    ///
    /// Defaults to `3600`.
    pub status_retention: u64,

    #[serde(default)]
    /// The maximum number of conversions running at once.
    ///
    /// Unlimited if not set.
    pub max_concurrency: Option<usize>,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.conversion.max_poll_attempts == 0 {
            return Err(anyhow!("`conversion.max_poll_attempts` must be at least 1"));
        }

        if self.conversion.poll_interval == 0 {
            return Err(anyhow!("`conversion.poll_interval` must be greater than 0"));
        }

        if self.max_concurrency == Some(0) {
            return Err(anyhow!("`max_concurrency` must be at least 1 if set"));
        }

        let poll_window = self.conversion.poll_interval() * self.conversion.max_poll_attempts;
        if self.status_retention() < poll_window {
            return Err(anyhow!(
                "`status_retention` must be at least {}s, the longest a job can be polled for",
                (poll_window.as_millis() + 999) / 1_000,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn status_retention(&self) -> Duration {
        Duration::from_secs(self.status_retention)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// The base URL of the job API, `/jobs` is appended to it.
    pub endpoint: String,

    #[serde(default = "default_target")]
    /// The format jobs convert to.
    ///
    /// Defaults to `pdf`.
    pub target: String,

    #[serde(default = "default_poll_interval")]
    /// The delay between two job status checks in milliseconds.
    ///
    /// Defaults to `2000`.
    pub poll_interval: u64,

    #[serde(default = "default_max_poll_attempts")]
    /// The number of status checks after which a job is abandoned
    /// and marked as timed out.
    ///
    /// Defaults to `150`.
    pub max_poll_attempts: u32,

    #[serde(default = "default_request_timeout")]
    /// The timeout for a single request to the service in seconds.
    ///
    /// Defaults to `30`.
    pub request_timeout: u64,
}

impl ConversionConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageAccountConfig {
    /// The account name sent with each job.
    pub name: String,

    #[serde(default = "default_source")]
    /// The cloud source type the conversion service reads from.
    ///
    /// Defaults to `azure`.
    pub source: String,
}

fn default_target() -> String {
    "pdf".to_string()
}

fn default_source() -> String {
    "azure".to_string()
}

const fn default_poll_interval() -> u64 {
    2_000
}

const fn default_max_poll_attempts() -> u32 {
    150
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_status_retention() -> u64 {
    3_600
}
