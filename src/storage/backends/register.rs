use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use serde::Deserialize;

use crate::storage::StorageBackend;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    /// Blobs live in process memory and are lost on restart.
    Memory,

    FileSystem {
        directory: PathBuf,
    },

    /// An S3 compatible bucket.
    ///
    /// Credentials left unset are resolved from the environment.
    BlobStorage {
        name: String,
        region: String,
        endpoint: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        security_token: Option<String>,
        session_token: Option<String>,
        request_timeout: Option<u64>,
    },
}

impl BackendConfigs {
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn StorageBackend>> {
        match self {
            Self::Memory => {
                Ok(Arc::new(super::memory::MemoryBackend::new()))
            },
            Self::FileSystem { directory } => {
                Ok(Arc::new(super::filesystem::FileSystemBackend::new(directory.clone())))
            },
            Self::BlobStorage {
                name,
                region,
                endpoint,
                access_key,
                secret_key,
                security_token,
                session_token,
                request_timeout,
            } => {
                let backend = super::blob_storage::BlobStorageBackend::new(
                    name.clone(),
                    region.clone(),
                    endpoint.clone(),
                    access_key.as_deref(),
                    secret_key.as_deref(),
                    security_token.as_deref(),
                    session_token.as_deref(),
                    request_timeout.map(Duration::from_secs),
                )?;

                Ok(Arc::new(backend))
            },
        }
    }
}
