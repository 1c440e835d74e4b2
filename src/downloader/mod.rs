//! Bulk frame download from the archive
//!
//! Downloads the frames named by a discovery result into a raw-data
//! directory. Fetches are best-effort per file: a failed frame is logged and
//! skipped so one broken file does not sink an otherwise complete batch.
//! Files are streamed into a scratch directory with their MD5 checksum
//! verified against the server's Content-MD5 header, and only renamed into
//! place once complete, so partial downloads are never visible.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use md5::{Digest, Md5};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, CatalogError};
use crate::config::DataRetrievalConfig;
use crate::models::FrameTable;
use crate::utils::{filename_from_disposition, filename_from_url};

/// Errors from the download boundary
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("download request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for {filename}")]
    ChecksumMismatch { filename: String },

    #[error("could not resolve download urls: {0}")]
    Urls(#[from] CatalogError),

    #[error("no usable filename for {url}")]
    NoFilename { url: String },
}

/// Outcome of one batch download
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub failed: usize,
}

/// Downloads fits files from the archive.
pub struct Downloader {
    catalog: Arc<dyn CatalogClient>,
    client: reqwest::Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    download_path: PathBuf,
    temp_path: PathBuf,
}

impl Downloader {
    /// Set up a downloader rooted at `work_dir`.
    ///
    /// The raw-data and scratch directories are recreated fresh, so stale
    /// frames from a previous run never leak into this one.
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        config: &DataRetrievalConfig,
        work_dir: &Path,
    ) -> Result<Self, DownloadError> {
        let download_path = work_dir.join(&config.raw_data_path);
        let temp_path = download_path.join(&config.temp_downloads_path);
        Self::prep_directory(&download_path)?;
        std::fs::create_dir_all(&temp_path)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_second)
            .unwrap_or(NonZeroU32::new(1).expect("1 is non-zero"));
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            catalog,
            client,
            rate_limiter,
            download_path,
            temp_path,
        })
    }

    fn prep_directory(directory: &Path) -> Result<(), std::io::Error> {
        if directory.exists() {
            std::fs::remove_dir_all(directory)?;
        }
        std::fs::create_dir_all(directory)
    }

    /// Directory completed frames land in
    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    /// Download every frame in `table`, best-effort.
    pub async fn fetch_all(&self, table: &FrameTable) -> Result<DownloadSummary, DownloadError> {
        let urls = self.catalog.data_urls(table).await?;
        let mut summary = DownloadSummary::default();

        for (row, url) in table.iter().zip(urls) {
            self.rate_limiter.until_ready().await;
            match self.fetch_one(&url).await {
                Ok(filename) => {
                    debug!(product_id = %row.product_id, filename = %filename, "Downloaded frame");
                    summary.downloaded += 1;
                }
                Err(e) => {
                    warn!(
                        product_id = %row.product_id,
                        error = %e,
                        "Frame failed to download"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            downloaded = summary.downloaded,
            failed = summary.failed,
            "Batch download finished"
        );
        Ok(summary)
    }

    /// Fetch a single file, returning the filename it was stored under.
    async fn fetch_one(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(url))
            .ok_or_else(|| DownloadError::NoFilename {
                url: url.to_string(),
            })?;

        let server_checksum = response
            .headers()
            .get("Content-MD5")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if server_checksum.is_none() {
            warn!(filename = %filename, "Content-MD5 header not found; skipping checksum validation");
        }

        self.write_with_temp_file(response, &filename, server_checksum.as_deref())
            .await?;
        Ok(filename)
    }

    /// Stream the body to a temp file, verify the checksum, then rename into
    /// the raw-data directory.
    async fn write_with_temp_file(
        &self,
        mut response: reqwest::Response,
        filename: &str,
        server_checksum: Option<&str>,
    ) -> Result<(), DownloadError> {
        let temp_file = self.temp_path.join(filename);
        let final_file = self.download_path.join(filename);

        let mut file = tokio::fs::File::create(&temp_file).await?;
        let mut checksum = Md5::new();

        while let Some(chunk) = response.chunk().await? {
            checksum.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = server_checksum {
            let actual = format!("{:x}", checksum.finalize());
            if actual != expected {
                tokio::fs::remove_file(&temp_file).await?;
                return Err(DownloadError::ChecksumMismatch {
                    filename: filename.to_string(),
                });
            }
        }

        tokio::fs::rename(&temp_file, &final_file).await?;
        Ok(())
    }
}
