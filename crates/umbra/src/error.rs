//! Resource loading errors.

use thiserror::Error;

/// Failure to fetch a stylesheet or an image through an injected
/// source. Loading never aborts theming; failed sheets keep their
/// fallback and failed images fall back to color heuristics.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source has nothing at the URL.
    #[error("no resource at {0}")]
    NotFound(String),
    /// The transport behind the source failed.
    #[error("failed to fetch {url}: {reason}")]
    Transport { url: String, reason: String },
}
