//! Unified error handling for the niripipe crate
//!
//! Each subsystem defines its own error enum next to the code that raises
//! it; this module wraps them into a single [`Error`] usable across module
//! boundaries, with a coarse [`ErrorCategory`] classification for handling
//! strategies (retry vs. abort).

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::catalog::headers::HeaderError;
pub use crate::catalog::CatalogError;
pub use crate::downloader::DownloadError;
pub use crate::finder::FinderError;
pub use crate::reducer::ReduceError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transient network or remote-service failures
    Network,
    /// Missing or insufficient data for the requested stack
    Data,
    /// Configuration and validation errors
    Config,
    /// Reduction engine failures
    Reduction,
    /// Local filesystem errors
    Storage,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the niripipe crate
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog query errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Header lookup errors
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    /// Data discovery errors
    #[error("Finder error: {0}")]
    Finder(#[from] FinderError),

    /// Download errors
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Reduction errors
    #[error("Reduction error: {0}")]
    Reduce(#[from] ReduceError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Check if this error is worth retrying at a coarser level
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Catalog(e) => !matches!(e, CatalogError::Malformed(_)),
            Self::Header(_) => true,
            Self::Finder(e) => matches!(e, FinderError::Query { .. }),
            Self::Download(e) => !matches!(e, DownloadError::NoFilename { .. }),
            Self::Reduce(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Catalog(_) | Self::Header(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Finder(e) => match e {
                FinderError::Config(_) => ErrorCategory::Config,
                FinderError::Query { .. } => ErrorCategory::Network,
                _ => ErrorCategory::Data,
            },
            Self::Download(e) => match e {
                DownloadError::Io(_) => ErrorCategory::Storage,
                _ => ErrorCategory::Network,
            },
            Self::Reduce(_) => ErrorCategory::Reduction,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
