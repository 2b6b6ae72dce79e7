use std::sync::Arc;

use bytes::Bytes;
use poem_openapi::{Enum, Object};
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::pipelines::{BlobCreated, ConversionPipeline, ConversionState};
use crate::storage::{Container, StorageBackend};
use crate::upload::{sanitize_filename, validate_username, UploadedImage};

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct UploadInfo {
    /// The name the image was stored under.
    pub name: String,

    /// The declared content type of the uploaded file.
    pub content_type: String,

    /// The size of the stored image in bytes.
    pub size: u64,

    /// Always `true`, failures are returned as errors.
    pub success: bool,

    /// The identifier of the blob write.
    pub request_id: String,

    /// The crc32 checksum of the uploaded image.
    pub checksum: u32,
}

#[derive(Enum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LookupStatus {
    /// The PDF exists and can be downloaded.
    #[oai(rename = "ready")]
    Ready,

    /// A conversion for this name is still running.
    #[oai(rename = "processing")]
    Processing,

    /// The last conversion for this name failed or timed out.
    #[oai(rename = "failed")]
    Failed,

    /// Nothing is known about this name.
    #[oai(rename = "not-found")]
    NotFound,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct LookupResult {
    /// Where the PDF can be downloaded from, set when `success` is `true`.
    pub download_uri: Option<String>,

    pub success: bool,

    pub status: LookupStatus,

    /// Why the last conversion failed.
    pub detail: Option<String>,
}

pub struct ConversionController {
    storage: Arc<dyn StorageBackend>,
    pipeline: Arc<ConversionPipeline>,
    download_base_url: String,
}

impl ConversionController {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        pipeline: Arc<ConversionPipeline>,
        download_base_url: String,
    ) -> Self {
        Self {
            storage,
            pipeline,
            download_base_url,
        }
    }

    /// Stores the image and starts its conversion in the background.
    pub async fn upload(
        &self,
        image: UploadedImage,
        owner: Option<String>,
    ) -> Result<UploadInfo, PipelineError> {
        if let Some(owner) = owner.as_deref() {
            validate_username(owner)?;
        }

        if self.storage.exists(Container::Images, &image.filename).await? {
            warn!(
                "Image {} already exists and will be replaced, uploads sharing a filename overwrite each other",
                &image.filename,
            );
        }

        let size = image.bytes.len() as u64;
        let checksum = crate::utils::checksum(&image.bytes);
        let request_id = self
            .storage
            .store(Container::Images, &image.filename, image.bytes)
            .await?;

        info!("Stored image {} ({} bytes) request id {}", &image.filename, size, &request_id);

        self.notify(BlobCreated {
            container: Container::Images,
            name: image.filename.clone(),
            owner,
        });

        Ok(UploadInfo {
            name: image.filename,
            content_type: image.content_type,
            size,
            success: true,
            request_id,
            checksum,
        })
    }

    /// Starts the conversion of a blob that has just been created.
    pub fn notify(&self, event: BlobCreated) -> JoinHandle<()> {
        self.pipeline.spawn(event)
    }

    pub async fn lookup(&self, username: &str) -> Result<LookupResult, PipelineError> {
        validate_username(username)?;
        let pdf_name = format!("{}.pdf", username);

        if self.storage.exists(Container::Pdfs, &pdf_name).await? {
            return Ok(LookupResult {
                download_uri: Some(crate::utils::join_url(&self.download_base_url, &pdf_name)),
                success: true,
                status: LookupStatus::Ready,
                detail: None,
            });
        }

        let (status, detail) = match self.pipeline.tracker().get(&pdf_name) {
            Some(state) if state.is_failure() => {
                let detail = match state {
                    ConversionState::Failed { detail } => detail,
                    other => format!("conversion {}", other.label()),
                };
                (LookupStatus::Failed, Some(detail))
            },
            Some(ConversionState::Done) | None => (LookupStatus::NotFound, None),
            Some(_) => (LookupStatus::Processing, None),
        };

        Ok(LookupResult {
            download_uri: None,
            success: false,
            status,
            detail,
        })
    }

    pub async fn fetch_pdf(&self, name: &str) -> Result<Option<Bytes>, PipelineError> {
        let name = checked_pdf_name(name)?;
        Ok(self.storage.fetch(Container::Pdfs, &name).await?)
    }

    /// Removes a PDF and forgets its conversion state.
    ///
    /// Returns `false` if there was no such PDF.
    pub async fn delete_pdf(&self, name: &str) -> Result<bool, PipelineError> {
        let name = checked_pdf_name(name)?;
        let removed = self.storage.delete(Container::Pdfs, &name).await?;
        self.pipeline.tracker().forget(&name);

        if removed {
            info!("Deleted {}", &name);
        }

        Ok(removed)
    }
}

fn checked_pdf_name(name: &str) -> Result<String, PipelineError> {
    match sanitize_filename(name) {
        Some(clean) if clean == name => Ok(clean),
        _ => Err(PipelineError::malformed(format!("'{}' is not a valid file name", name))),
    }
}
