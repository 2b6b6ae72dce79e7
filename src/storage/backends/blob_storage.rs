use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use s3::{Bucket, Region};
use s3::creds::Credentials;
use uuid::Uuid;

use crate::storage::{Container, StorageBackend};

/// An S3 compatible bucket, containers become key prefixes.
pub struct BlobStorageBackend {
    bucket: Bucket,
}

impl BlobStorageBackend {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        region: String,
        endpoint: String,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        security_token: Option<&str>,
        session_token: Option<&str>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let creds = Credentials::new(access_key, secret_key, security_token, session_token, None)?;
        let region = Region::Custom { region, endpoint };
        let mut bucket = Bucket::new(&name, region, creds)?;
        bucket.set_request_timeout(request_timeout);

        Ok(Self {
            bucket
        })
    }

    #[inline]
    fn format_path(&self, container: Container, name: &str) -> String {
        format!("{}/{}", container, name)
    }
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    async fn store(
        &self,
        container: Container,
        name: &str,
        data: Bytes,
    ) -> anyhow::Result<String> {
        let store_in = self.format_path(container, name);

        debug!("Storing blob in bucket @ {}", &store_in);
        let (_, code) = self.bucket.put_object(store_in, &data).await?;
        if code != 200 {
            Err(anyhow!("Remote storage bucket did not respond correctly, expected status 200 got {}", code))
        } else {
            Ok(Uuid::new_v4().to_string())
        }
    }

    async fn fetch(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<Option<Bytes>> {
        let store_in = self.format_path(container, name);

        debug!("Retrieving blob in bucket @ {}", &store_in);
        let (data, code) = self.bucket.get_object(store_in).await?;
        if code == 404 {
            Ok(None)
        } else if code != 200 {
            Err(anyhow!("Remote storage bucket did not respond correctly, expected status 200 got {}", code))
        } else {
            Ok(Some(data.into()))
        }
    }

    async fn exists(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool> {
        let store_in = self.format_path(container, name);

        let (_, code) = self.bucket.head_object(store_in).await?;
        match code {
            200 => Ok(true),
            404 => Ok(false),
            other => Err(anyhow!(
                "Remote storage bucket did not respond correctly, \
                expected status 200 or 404 got {}", other
            )),
        }
    }

    async fn delete(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool> {
        let store_in = self.format_path(container, name);

        debug!("Purging blob in bucket @ {}", &store_in);
        let (_, code) = self.bucket.delete_object(store_in).await?;
        match code {
            200 | 204 => Ok(true),
            404 => Ok(false),
            other => Err(anyhow!(
                "Remote storage bucket did not respond correctly, \
                expected status 200 got {}", other
            )),
        }
    }
}
