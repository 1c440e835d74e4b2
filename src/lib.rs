//! niripipe - Automated Gemini NIRI data retrieval and reduction
//!
//! Finds, downloads and reduces NIRI imaging data from a remote archive.
//! Given a science observation name, the pipeline locates the matching
//! calibration frames (flats, long darks, short darks), fetches everything,
//! and drives an external reduction engine over the result.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`catalog`] - Remote catalog queries and per-file header lookups
//! - [`finder`] - Calibration discovery, matching and segmentation
//! - [`downloader`] - Bulk frame download with checksum verification
//! - [`reducer`] - External reduction engine orchestration
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use niripipe::catalog::headers::ArchiveHeaderClient;
//! use niripipe::catalog::TapClient;
//! use niripipe::config::Config;
//! use niripipe::finder::Finder;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let catalog = Arc::new(TapClient::new(&config.services.tap_url)?);
//! let headers = Arc::new(ArchiveHeaderClient::new(&config.services.data_url, 4)?);
//!
//! let mut finder = Finder::new(catalog, headers, config.datafinder, "GN-2019A-FT-108-12")?;
//! let frames = finder.run().await?;
//! println!("found {} frames", frames.len());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod error;
pub mod finder;
pub mod models;
pub mod reducer;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{CatalogClient, TapClient};
    pub use crate::config::Config;
    pub use crate::downloader::Downloader;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::finder::Finder;
    pub use crate::models::{FrameRecord, FrameRole, FrameTable, ProductSet, StackContext};
    pub use crate::reducer::Reducer;
}

// Direct re-exports for convenience
pub use models::{FrameRecord, FrameRole, FrameTable, MatchPolicy, ProductSet, StackContext};
