use std::path::Path;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::upload::validate_username;

/// The stored image as reported by the upload endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub success: bool,
    pub request_id: String,
    pub checksum: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupBody {
    download_uri: Option<String>,
    success: bool,
    status: Option<String>,
    detail: Option<String>,
}

/// What a lookup found out about a user's PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The PDF has not been converted yet, check again later.
    NotReady,

    /// The conversion failed, checking again will not help.
    Failed { detail: String },

    /// The PDF can be downloaded.
    Ready { download_uri: String },
}

impl LookupOutcome {
    /// The message shown to the user for this outcome.
    pub fn describe(&self, username: &str) -> String {
        match self {
            Self::NotReady => format!(
                "Your file named {}.pdf has not been converted yet. Please keep checking!",
                username,
            ),
            Self::Failed { detail } => format!(
                "The conversion of {}.pdf failed: {}. Please upload your image again.",
                username, detail,
            ),
            Self::Ready { download_uri } => format!(
                "Found {}.pdf! Download it from {}",
                username, download_uri,
            ),
        }
    }
}

/// Talks to the service's upload, lookup and delete endpoints.
#[derive(Clone)]
pub struct ConverterClient {
    http: reqwest::Client,
    base_url: String,
}

impl ConverterClient {
    /// `base_url` is the root of the API, e.g. `http://127.0.0.1:8000/api`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Uploads an image on behalf of `username`.
    pub async fn upload(
        &self,
        username: &str,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadReceipt> {
        validate_username(username)?;

        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new().part("image", part);

        debug!("Posting {} for {}", filename, username);
        let resp = self
            .http
            .post(self.url("uploadImage"))
            .header("username", username)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("upload rejected with {}: {}", status, body));
        }

        Ok(resp.json().await?)
    }

    /// Uploads an image file from disk, guessing its content type from
    /// the extension.
    pub async fn upload_file(&self, username: &str, path: &Path) -> Result<UploadReceipt> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("{:?} does not name a file", path))?;
        let data = tokio::fs::read(path).await?;

        self.upload(username, filename, guess_content_type(path).as_ref(), data).await
    }

    /// Asks whether `<username>.pdf` is ready yet.
    ///
    /// This checks once, callers wanting to wait call it again.
    pub async fn lookup(&self, username: &str) -> Result<LookupOutcome> {
        validate_username(username)?;

        let resp = self
            .http
            .get(self.url("downloadphoto"))
            .header("username", username)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("lookup failed with {}", resp.status()));
        }

        let body: LookupBody = resp.json().await?;
        Ok(match (body.success, body.download_uri) {
            (true, Some(download_uri)) => LookupOutcome::Ready { download_uri },
            (true, None) => return Err(anyhow!("lookup succeeded without a download uri")),
            (false, _) if body.status.as_deref() == Some("failed") => LookupOutcome::Failed {
                detail: body.detail.unwrap_or_else(|| "unknown error".to_string()),
            },
            (false, _) => LookupOutcome::NotReady,
        })
    }

    /// Downloads the PDF behind a download link.
    pub async fn download(&self, download_uri: &str) -> Result<Bytes> {
        let resp = self.http.get(download_uri).send().await?;

        if !resp.status().is_success() {
            return Err(anyhow!("download failed with {}", resp.status()));
        }

        Ok(resp.bytes().await?)
    }

    /// Saves the PDF behind `download_uri` to `output`.
    ///
    /// With `delete_after` set the service is asked to remove the PDF, but
    /// only once it has been written to disk.
    pub async fn save_pdf(
        &self,
        username: &str,
        download_uri: &str,
        output: &Path,
        delete_after: bool,
    ) -> Result<usize> {
        let data = self.download(download_uri).await?;
        tokio::fs::write(output, &data).await?;
        info!("Saved {} bytes to {:?}", data.len(), output);

        if delete_after {
            // Only waited on so the request is sent before the process exits.
            let _ = self.delete_pdf(username).await;
        }

        Ok(data.len())
    }

    /// Asks the service to delete `<username>.pdf` without waiting for it.
    ///
    /// Failures are logged and otherwise ignored, the download has already
    /// happened by the time this is called.
    pub fn delete_pdf(&self, username: &str) -> JoinHandle<()> {
        let client = self.clone();
        let file = format!("{}.pdf", username);

        tokio::spawn(async move {
            let res = client
                .http
                .get(client.url("deletePDF"))
                .header("file", &file)
                .send()
                .await;

            match res {
                Ok(resp) if resp.status().is_success() => debug!("Requested deletion of {}", &file),
                Ok(resp) => warn!("Deleting {} was refused with {}", &file, resp.status()),
                Err(e) => warn!("Failed to request deletion of {}: {}", &file, e),
            }
        })
    }
}

fn guess_content_type(path: &Path) -> mime::Mime {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => mime::IMAGE_PNG,
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("bmp") => mime::IMAGE_BMP,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/downloadphoto"))
            .and(header("username", "bob"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "downloadUri": null,
                "success": false,
                "status": "not-found",
            })))
            .mount(&server)
            .await;

        let client = ConverterClient::new(&format!("{}/api", server.uri()));
        let outcome = client.lookup("bob").await.unwrap();
        assert_eq!(outcome, LookupOutcome::NotReady);
        assert!(outcome.describe("bob").contains("bob.pdf has not been converted yet"));
    }

    #[tokio::test]
    async fn test_lookup_failed_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/downloadphoto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "status": "failed",
                "detail": "conversion job job-1 failed: unsupported file",
            })))
            .mount(&server)
            .await;

        let client = ConverterClient::new(&format!("{}/api", server.uri()));
        match client.lookup("alice").await.unwrap() {
            LookupOutcome::Failed { detail } => assert!(detail.contains("unsupported file")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/downloadphoto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "downloadUri": "http://localhost/api/pdfs/alice.pdf",
                "success": true,
                "status": "ready",
            })))
            .mount(&server)
            .await;

        let client = ConverterClient::new(&format!("{}/api/", server.uri()));
        let outcome = client.lookup("alice").await.unwrap();
        assert_eq!(outcome, LookupOutcome::Ready {
            download_uri: "http://localhost/api/pdfs/alice.pdf".to_string(),
        });
    }

    #[tokio::test]
    async fn test_invalid_username_never_hits_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ConverterClient::new(&format!("{}/api", server.uri()));
        assert!(client.lookup("alice smith").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_failure_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/deletePDF"))
            .and(header("file", "alice.pdf"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = ConverterClient::new(&format!("{}/api", server.uri()));
        client.delete_pdf("alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_pdf_deletes_after_writing() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pdfs/alice.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/deletePDF"))
            .and(header("file", "alice.pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let output = dir.path().join("alice.pdf");
        let client = ConverterClient::new(&format!("{}/api", server.uri()));

        let uri = format!("{}/api/pdfs/alice.pdf", server.uri());
        let size = client.save_pdf("alice", &uri, &output, true).await?;
        assert_eq!(size, 8);
        assert_eq!(tokio::fs::read(&output).await?, b"%PDF-1.4");

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_download_keeps_pdf() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pdfs/alice.pdf"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/deletePDF"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let output = dir.path().join("alice.pdf");
        let client = ConverterClient::new(&format!("{}/api", server.uri()));

        let uri = format!("{}/api/pdfs/alice.pdf", server.uri());
        assert!(client.save_pdf("alice", &uri, &output, true).await.is_err());
        assert!(!output.exists());

        Ok(())
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("cat.PNG")), mime::IMAGE_PNG);
        assert_eq!(guess_content_type(Path::new("dog.jpeg")), mime::IMAGE_JPEG);
        assert_eq!(guess_content_type(Path::new("notes")), mime::APPLICATION_OCTET_STREAM);
    }
}
