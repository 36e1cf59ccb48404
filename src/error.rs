//! Error types for each pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

/// Network or cache I/O failure while obtaining a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("request failed: {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("page cache I/O failed: {}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_owned(),
            }
        } else {
            FetchError::Transport {
                url: url.to_owned(),
                source: err,
            }
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::ClientBuild(_) | FetchError::Cache { .. } => false,
        }
    }
}

/// The page does not have the structure the extractor expects.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("content container not found (tried: {selectors})")]
    MissingContainer { selectors: String },

    #[error("content container is empty")]
    EmptyContent,

    #[error("invalid CSS selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// One image could not be localized.
#[derive(Debug, Error)]
pub enum ImageConversionError {
    #[error("fetch image {target}")]
    Fetch {
        target: String,
        #[source]
        source: FetchError,
    },

    #[error("read image {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode image {target}")]
    Decode {
        target: String,
        #[source]
        source: image::ImageError,
    },

    #[error("encode png for {target}")]
    Encode {
        target: String,
        #[source]
        source: image::ImageError,
    },

    #[error("write image {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The external document converter did not produce the PDF.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("converter not found: {program}")]
    NotFound { program: String },

    #[error("converter failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("converter timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("run converter: {program}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
