use thiserror::Error;

/// Recoverable failures raised by the acquisition pipeline. Every variant is
/// caught at the boundary of the component that produced it and converted
/// into a fallback action or an empty result; none of them abort a request.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("render failure: {0}")]
    Render(String),

    #[error("crawl failure: {0}")]
    Crawl(String),

    #[error("extraction failure: {0}")]
    Extraction(String),

    #[error("resolution failure: {0}")]
    Resolution(String),

    #[error("oracle failure: {0}")]
    Oracle(String),
}
