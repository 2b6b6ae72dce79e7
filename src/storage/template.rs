use async_trait::async_trait;
use bytes::Bytes;
use strum::{AsRefStr, Display};

/// The two containers the service reads from and writes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Container {
    /// Uploaded source images.
    Images,

    /// Converted PDFs, named `<username>.pdf`.
    Pdfs,
}

#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    /// Writes the blob, replacing any existing blob with the same name.
    ///
    /// Returns an identifier for the write that can be echoed to the client.
    async fn store(
        &self,
        container: Container,
        name: &str,
        data: Bytes,
    ) -> anyhow::Result<String>;

    async fn fetch(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<Option<Bytes>>;

    async fn exists(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool>;

    /// Removes the blob. Returns `false` if there was nothing to remove.
    async fn delete(
        &self,
        container: Container,
        name: &str,
    ) -> anyhow::Result<bool>;
}
