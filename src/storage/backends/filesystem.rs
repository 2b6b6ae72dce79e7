use std::io::ErrorKind;
use std::path::PathBuf;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::storage::{Container, StorageBackend};

pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            directory: dir,
        }
    }

    #[inline]
    fn format_path(&self, container: Container) -> PathBuf {
        self.directory.join(container.as_ref())
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn store(
        &self,
        container: Container,
        name: &str,
        data: Bytes,
    ) -> anyhow::Result<String> {
        let store_in = self.format_path(container);
        let path = store_in.join(name);

        debug!("Storing blob @ {:?}", &path);
        match tokio::fs::write(&path, &data).await {
            Ok(()) => {},
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(store_in).await?;
                tokio::fs::write(&path, data).await?;
            },
            Err(other) => return Err(other.into()),
        }

        Ok(Uuid::new_v4().to_string())
    }

    async fn fetch(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<Option<Bytes>> {
        let path = self.format_path(container).join(name);

        debug!("Retrieving blob @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn exists(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool> {
        let path = self.format_path(container).join(name);

        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    async fn delete(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool> {
        let path = self.format_path(container).join(name);

        debug!("Purging blob @ {:?}", &path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_creates_container_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileSystemBackend::new(dir.path().to_path_buf());

        backend.store(Container::Images, "cat.png", Bytes::from_static(b"meow")).await?;

        let on_disk = tokio::fs::read(dir.path().join("images").join("cat.png")).await?;
        assert_eq!(on_disk, b"meow");
        assert!(backend.exists(Container::Images, "cat.png").await?);
        assert!(!backend.exists(Container::Pdfs, "cat.png").await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_blob_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileSystemBackend::new(dir.path().to_path_buf());

        assert!(backend.fetch(Container::Pdfs, "bob.pdf").await?.is_none());
        assert!(!backend.delete(Container::Pdfs, "bob.pdf").await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_blob() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileSystemBackend::new(dir.path().to_path_buf());

        backend.store(Container::Pdfs, "alice.pdf", Bytes::from_static(b"%PDF")).await?;
        assert!(backend.delete(Container::Pdfs, "alice.pdf").await?);
        assert!(backend.fetch(Container::Pdfs, "alice.pdf").await?.is_none());

        Ok(())
    }
}
