use std::collections::HashMap;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::storage::{Container, StorageBackend};

/// Keeps every blob in process memory.
///
/// Nothing survives a restart, this is meant for local runs and tests.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<(Container, String), Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The names currently held in the given container, sorted.
    #[cfg(test)]
    pub async fn names(&self, container: Container) -> Vec<String> {
        let blobs = self.blobs.read().await;
        let mut names: Vec<String> = blobs
            .keys()
            .filter(|(c, _)| *c == container)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store(
        &self,
        container: Container,
        name: &str,
        data: Bytes,
    ) -> anyhow::Result<String> {
        debug!("Storing blob in memory @ {}/{}", container, name);
        self.blobs.write().await.insert((container, name.to_string()), data);
        Ok(Uuid::new_v4().to_string())
    }

    async fn fetch(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<Option<Bytes>> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(&(container, name.to_string())).cloned())
    }

    async fn exists(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(&(container, name.to_string())))
    }

    async fn delete(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool> {
        let removed = self.blobs.write().await.remove(&(container, name.to_string()));
        Ok(removed.is_some())
    }
}
