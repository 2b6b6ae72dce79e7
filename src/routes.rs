use std::sync::Arc;

use poem::{Body, Request};
use poem_openapi::param::{Header, Path};
use poem_openapi::payload::{Binary, Json};
use poem_openapi::{ApiResponse, Object, OpenApi};

use crate::controller::{ConversionController, LookupResult, UploadInfo};
use crate::error::PipelineError;
use crate::pipelines::BlobCreated;
use crate::storage::Container;

#[derive(Object, Debug)]
pub struct Detail {
    /// Additional information regarding the response.
    detail: String,
}

impl Detail {
    fn from_error(e: &PipelineError) -> Json<Self> {
        Json(Self { detail: e.to_string() })
    }
}

#[derive(Object, Debug)]
pub struct Acknowledged {
    /// Whether anything was removed.
    removed: bool,
}

#[derive(Object, Debug)]
pub struct BlobEventData {
    /// The full URL of the created blob.
    url: String,
}

/// A storage event announcing a new blob.
///
/// Only the last two path segments of the URL are used, the
/// container and the blob name.
#[derive(Object, Debug)]
pub struct BlobCreatedEvent {
    data: BlobEventData,

    /// The user the blob belongs to, if known.
    owner: Option<String>,
}

#[derive(ApiResponse)]
pub enum UploadResponse {
    /// The image was stored and its conversion has started.
    #[oai(status = 200)]
    Ok(Json<UploadInfo>),

    /// The request body is not a usable multipart upload.
    #[oai(status = 400)]
    Malformed(Json<Detail>),

    /// The image could not be stored.
    #[oai(status = 500)]
    StorageFailure(Json<Detail>),
}

#[derive(ApiResponse)]
pub enum LookupResponse {
    /// The current state of the user's PDF.
    #[oai(status = 200)]
    Ok(Json<LookupResult>),

    /// The username is not valid.
    #[oai(status = 400)]
    InvalidUsername(Json<Detail>),

    #[oai(status = 500)]
    StorageFailure(Json<Detail>),
}

#[derive(ApiResponse)]
pub enum DeleteResponse {
    #[oai(status = 200)]
    Ok(Json<Acknowledged>),

    /// The file name is not valid.
    #[oai(status = 400)]
    InvalidName(Json<Detail>),

    #[oai(status = 500)]
    StorageFailure(Json<Detail>),
}

#[derive(ApiResponse)]
pub enum FetchPdfResponse {
    /// The raw PDF data.
    #[oai(status = 200)]
    Ok(Binary<Vec<u8>>),

    /// The file name is not valid.
    #[oai(status = 400)]
    InvalidName(Json<Detail>),

    /// No PDF exists with this name.
    #[oai(status = 404)]
    NotFound,

    #[oai(status = 500)]
    StorageFailure(Json<Detail>),
}

#[derive(ApiResponse)]
pub enum EventResponse {
    /// The conversion has been started.
    #[oai(status = 202)]
    Accepted,

    /// The event does not describe a blob in the image container.
    #[oai(status = 400)]
    Rejected(Json<Detail>),
}

pub struct ConverterApi {
    controller: Arc<ConversionController>,
}

impl ConverterApi {
    pub fn new(controller: Arc<ConversionController>) -> Self {
        Self { controller }
    }
}

#[OpenApi]
impl ConverterApi {
    /// Upload Image
    ///
    /// Takes a `multipart/form-data` body and stores its first file part in
    /// the image container under the part's filename. The image is then
    /// converted to a PDF in the background.
    ///
    /// If the `username` header is given the PDF will be named `<username>.pdf`,
    /// otherwise it is named after the image.
    #[oai(path = "/uploadImage", method = "post")]
    pub async fn upload_image(
        &self,
        req: &Request,
        body: Body,
        username: Header<Option<String>>,
    ) -> UploadResponse {
        let data = match body.into_bytes().await {
            Ok(data) => data,
            Err(e) => {
                let e = PipelineError::malformed(format!("failed to read request body: {}", e));
                return UploadResponse::Malformed(Detail::from_error(&e));
            },
        };

        let image = match crate::upload::parse_upload(req.content_type(), data).await {
            Ok(image) => image,
            Err(e) => return UploadResponse::Malformed(Detail::from_error(&e)),
        };

        match self.controller.upload(image, username.0).await {
            Ok(info) => UploadResponse::Ok(Json(info)),
            Err(e @ PipelineError::MalformedRequest(_)) => UploadResponse::Malformed(Detail::from_error(&e)),
            Err(e) => {
                error!("Failed to store upload: {}", e);
                UploadResponse::StorageFailure(Detail::from_error(&e))
            },
        }
    }

    /// Lookup PDF
    ///
    /// Checks whether `<username>.pdf` exists yet. `success` is only `true`
    /// once the PDF can be downloaded from `downloadUri`, `status` tells a
    /// running conversion apart from a failed one.
    #[oai(path = "/downloadphoto", method = "get")]
    pub async fn lookup(&self, username: Header<String>) -> LookupResponse {
        match self.controller.lookup(&username.0).await {
            Ok(res) => LookupResponse::Ok(Json(res)),
            Err(e @ PipelineError::MalformedRequest(_)) => LookupResponse::InvalidUsername(Detail::from_error(&e)),
            Err(e) => {
                error!("Failed to look up PDF for {}: {}", &username.0, e);
                LookupResponse::StorageFailure(Detail::from_error(&e))
            },
        }
    }

    /// Delete PDF
    ///
    /// Removes the PDF named by the `file` header, e.g. `alice.pdf`.
    #[oai(path = "/deletePDF", method = "get")]
    pub async fn delete_pdf(&self, file: Header<String>) -> DeleteResponse {
        match self.controller.delete_pdf(&file.0).await {
            Ok(removed) => DeleteResponse::Ok(Json(Acknowledged { removed })),
            Err(e @ PipelineError::MalformedRequest(_)) => DeleteResponse::InvalidName(Detail::from_error(&e)),
            Err(e) => {
                error!("Failed to delete {}: {}", &file.0, e);
                DeleteResponse::StorageFailure(Detail::from_error(&e))
            },
        }
    }

    /// Fetch PDF
    ///
    /// Returns the raw bytes of a converted PDF.
    #[oai(path = "/pdfs/:name", method = "get")]
    pub async fn fetch_pdf(&self, name: Path<String>) -> FetchPdfResponse {
        match self.controller.fetch_pdf(&name.0).await {
            Ok(Some(data)) => FetchPdfResponse::Ok(Binary(data.to_vec())),
            Ok(None) => FetchPdfResponse::NotFound,
            Err(e @ PipelineError::MalformedRequest(_)) => FetchPdfResponse::InvalidName(Detail::from_error(&e)),
            Err(e) => {
                error!("Failed to fetch {}: {}", &name.0, e);
                FetchPdfResponse::StorageFailure(Detail::from_error(&e))
            },
        }
    }

    /// Blob Created Event
    ///
    /// Starts the conversion of an image that was written to the image
    /// container by something other than the upload endpoint.
    #[oai(path = "/events/blob-created", method = "post")]
    pub async fn blob_created(&self, event: Json<BlobCreatedEvent>) -> EventResponse {
        let event = event.0;
        let blob = match parse_blob_url(&event.data.url) {
            Ok(blob) => blob,
            Err(e) => return EventResponse::Rejected(Detail::from_error(&e)),
        };

        if let Some(owner) = event.owner.as_deref() {
            if let Err(e) = crate::upload::validate_username(owner) {
                return EventResponse::Rejected(Detail::from_error(&e));
            }
        }

        info!("Image that was uploaded: {}", &blob);
        self.controller.notify(BlobCreated {
            container: Container::Images,
            name: blob,
            owner: event.owner,
        });

        EventResponse::Accepted
    }
}

/// Extracts the blob name from a blob URL in the image container.
fn parse_blob_url(url: &str) -> Result<String, PipelineError> {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let mut segments = path.rsplit('/');

    let name = segments.next().unwrap_or_default();
    let container = segments.next().unwrap_or_default();

    if container != Container::Images.as_ref() {
        return Err(PipelineError::malformed(format!(
            "'{}' is not a blob in the {} container",
            url,
            Container::Images,
        )));
    }

    let name = urlencoding::decode(name)
        .map_err(|_| PipelineError::malformed(format!("'{}' does not name a blob", url)))?;

    crate::upload::sanitize_filename(&name)
        .filter(|clean| *clean == name)
        .ok_or_else(|| PipelineError::malformed(format!("'{}' does not name a blob", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blob_url() {
        let name = parse_blob_url("https://account.blob.core.windows.net/images/cat.png").unwrap();
        assert_eq!(name, "cat.png");

        let name = parse_blob_url("https://account.blob.core.windows.net/images/cat.png?sv=2020").unwrap();
        assert_eq!(name, "cat.png");
    }

    #[test]
    fn test_parse_blob_url_decodes_name() {
        let name = parse_blob_url("https://account.blob.core.windows.net/images/my%20cat.png").unwrap();
        assert_eq!(name, "my cat.png");

        assert!(parse_blob_url("https://account.blob.core.windows.net/images/..%2Fpdfs%2Falice.pdf").is_err());
    }

    #[test]
    fn test_parse_blob_url_rejects_other_containers() {
        assert!(parse_blob_url("https://account.blob.core.windows.net/pdfs/alice.pdf").is_err());
        assert!(parse_blob_url("https://account.blob.core.windows.net/images/").is_err());
        assert!(parse_blob_url("cat.png").is_err());
    }
}
