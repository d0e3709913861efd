use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ScrapeError;
use crate::fetch::USER_AGENT;
use crate::locate::DocumentExtractor;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Downloads a document and pulls plain text out of it, trying a fast parser
/// first and an alternate one over the same bytes when that yields nothing.
pub struct PdfExtractor {
    client: reqwest::Client,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| ScrapeError::Transport(format!("document download failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ScrapeError::Transport(format!(
                "document download returned status {} for {}",
                resp.status(),
                url
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ScrapeError::Transport(format!("document body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract(&self, url: &str) -> Result<String, ScrapeError> {
        let bytes = self.download(url).await?;
        debug!("downloaded {} bytes from {}", bytes.len(), url);
        text_from_pdf(&bytes)
    }
}

/// Both parsers failing is an `Extraction` error; a parser succeeding on a
/// document with no text layer is `Ok` with empty text.
fn text_from_pdf(bytes: &[u8]) -> Result<String, ScrapeError> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(_) => debug!("primary extraction produced no text, trying the alternate parser"),
        Err(e) => debug!("primary extraction failed: {e}"),
    }

    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ScrapeError::Extraction(format!("document not parseable: {e}")))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages)
        .map_err(|e| ScrapeError::Extraction(format!("no extractable text: {e}")))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_with_an_extraction_error() {
        let err = text_from_pdf(b"this is not a pdf at all").unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[test]
    fn truncated_header_still_fails_cleanly() {
        let err = text_from_pdf(b"%PDF-1.7\nbroken").unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }
}
