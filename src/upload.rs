use bytes::Bytes;
use futures::stream;

use crate::error::PipelineError;

/// A single file taken out of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// The declared filename with any client side directories removed.
    pub filename: String,

    /// The declared content type of the part.
    pub content_type: String,

    /// The raw bytes of the part.
    pub bytes: Bytes,
}

/// Parses a `multipart/form-data` body and returns its first part.
///
/// The boundary is read from the given `content-type` header value.
/// Any parts after the first one are ignored.
pub async fn parse_upload(
    content_type: Option<&str>,
    body: Bytes,
) -> Result<UploadedImage, PipelineError> {
    let content_type = content_type
        .ok_or_else(|| PipelineError::malformed("missing content-type header"))?;

    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| PipelineError::malformed(format!("no multipart boundary: {}", e)))?;

    let body = stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(body, boundary);

    let field = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::malformed(format!("failed to parse multipart body: {}", e)))?
        .ok_or_else(|| PipelineError::malformed("multipart body contains no parts"))?;

    let filename = field
        .file_name()
        .and_then(sanitize_filename)
        .ok_or_else(|| PipelineError::malformed("first part has no usable filename"))?;

    let content_type = field
        .content_type()
        .map(|m| m.to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    let bytes = field
        .bytes()
        .await
        .map_err(|e| PipelineError::malformed(format!("failed to read part body: {}", e)))?;

    Ok(UploadedImage {
        filename,
        content_type,
        bytes,
    })
}

/// Strips any directories a browser attached to the filename.
///
/// Returns `None` for names that cannot be used as a blob name.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    Some(name.to_string())
}

/// A username must be non-empty and contain no whitespace, it becomes
/// part of a blob name.
pub fn validate_username(username: &str) -> Result<(), PipelineError> {
    if username.is_empty() {
        return Err(PipelineError::malformed("username cannot be empty"));
    }

    if username.chars().any(char::is_whitespace) {
        return Err(PipelineError::malformed("username cannot contain whitespace"));
    }

    if username.contains(|c: char| c == '/' || c == '\\') || username == "." || username == ".." {
        return Err(PipelineError::malformed("username cannot contain path separators"));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn multipart_body(boundary: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n", filename)
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
