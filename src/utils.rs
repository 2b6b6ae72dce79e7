use std::path::Path;

/// The CRC32 checksum of an uploaded payload.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// The name a converted PDF is stored under.
///
/// Uploads made on behalf of a user are named after that user, anything
/// else is named after the source image without its extension.
pub fn pdf_name_for(owner: Option<&str>, image_name: &str) -> String {
    let base = match owner {
        Some(owner) => owner,
        None => Path::new(image_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(image_name),
    };

    format!("{}.pdf", base)
}

/// Appends a blob name to a base URL as its final, percent-encoded path segment.
pub fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), urlencoding::encode(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_name_uses_owner() {
        assert_eq!(pdf_name_for(Some("alice"), "cat.png"), "alice.pdf");
    }

    #[test]
    fn test_pdf_name_falls_back_to_basename() {
        assert_eq!(pdf_name_for(None, "cat.png"), "cat.pdf");
        assert_eq!(pdf_name_for(None, "holiday.photo.jpeg"), "holiday.photo.pdf");
        assert_eq!(pdf_name_for(None, "scan"), "scan.pdf");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://localhost:8000/api/pdfs/", "alice.pdf"), "http://localhost:8000/api/pdfs/alice.pdf");
        assert_eq!(join_url("http://localhost:8000/api/pdfs", "alice.pdf"), "http://localhost:8000/api/pdfs/alice.pdf");
    }

    #[test]
    fn test_join_url_encodes_name() {
        assert_eq!(join_url("http://localhost:8000/api/pdfs", "a?b.pdf"), "http://localhost:8000/api/pdfs/a%3Fb.pdf");
        assert_eq!(join_url("http://localhost:8000/api/pdfs", "50%#1.pdf"), "http://localhost:8000/api/pdfs/50%25%231.pdf");
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }
}
