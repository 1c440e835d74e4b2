//! Per-file header metadata lookup
//!
//! Not everything the finder needs is exposed by the catalog's tabular
//! interface. The camera a frame was taken with only lives in its FITS
//! header, so it is fetched from the archive's data endpoint in header-only
//! mode and parsed out of the card text. The intention is to use this side
//! channel as little as possible.

use std::num::NonZeroU32;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors from the header lookup boundary
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("header request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no CAMERA card in header of {product_id}")]
    CardMissing { product_id: String },

    #[error("malformed header endpoint: {0}")]
    Malformed(String),
}

/// Header-card lookup keyed by product id.
///
/// Only the CAMERA card is needed today; the trait stays narrow on purpose.
#[async_trait]
pub trait HeaderStore: Send + Sync {
    async fn camera(&self, product_id: &str) -> Result<String, HeaderError>;
}

/// Header client fetching card text from the archive data service.
pub struct ArchiveHeaderClient {
    client: reqwest::Client,
    base_url: Url,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl ArchiveHeaderClient {
    /// Create a client limited to `requests_per_second` archive calls
    pub fn new(base_url: &str, requests_per_second: u32) -> Result<Self, HeaderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| HeaderError::Malformed(format!("invalid data url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .gzip(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second)
            .unwrap_or(NonZeroU32::new(1).expect("1 is non-zero"));
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            base_url,
            rate_limiter,
        })
    }

    /// Extract the CAMERA value from FITS card text.
    ///
    /// Cards look like: CAMERA  = 'f6                 ' / Camera used
    fn parse_camera(contents: &str) -> Option<String> {
        static CAMERA_RE: OnceLock<Regex> = OnceLock::new();

        let re = CAMERA_RE
            .get_or_init(|| Regex::new(r"CAMERA\s*=\s*'([^'\s]+)").expect("Invalid regex pattern"));

        re.captures(contents)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl HeaderStore for ArchiveHeaderClient {
    async fn camera(&self, product_id: &str) -> Result<String, HeaderError> {
        self.rate_limiter.until_ready().await;

        let mut endpoint = self
            .base_url
            .join(&format!("{product_id}.fits"))
            .map_err(|e| HeaderError::Malformed(format!("invalid product path: {e}")))?;
        endpoint.query_pairs_mut().append_pair("fhead", "true");

        debug!(product_id = %product_id, "Fetching header cards");
        let contents = self
            .client
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Self::parse_camera(&contents).ok_or_else(|| HeaderError::CardMissing {
            product_id: product_id.to_string(),
        })
    }
}
