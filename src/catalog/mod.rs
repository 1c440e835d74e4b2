//! Remote catalog access
//!
//! The archive's tabular catalog runs queries asynchronously: a job is
//! created, started, polled to completion and its result fetched as rows.
//! [`TapClient`] wraps that protocol behind the [`CatalogClient`] trait so the
//! finder never sees job plumbing, and tests can substitute an in-memory
//! implementation.

pub mod headers;
pub mod query;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::FrameTable;
use query::CatalogQuery;

/// Errors from the catalog service boundary
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Transport-level failure
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service reported a terminal non-success phase for a query job
    #[error("catalog job {job_id} ended in phase {phase}")]
    JobFailed { job_id: String, phase: String },

    /// The job never reached a terminal phase within the polling budget
    #[error("catalog job did not complete within {0:?}")]
    PollTimeout(Duration),

    /// The service answered with something the client cannot interpret
    #[error("malformed catalog response: {0}")]
    Malformed(String),
}

/// Queryable archive catalog.
///
/// `query` blocks (asynchronously) until the remote job completes and the
/// full result table is available. `data_urls` resolves each row's publisher
/// id to a download URL, preserving row order.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn query(&self, query: &CatalogQuery) -> Result<FrameTable, CatalogError>;

    async fn data_urls(&self, table: &FrameTable) -> Result<Vec<String>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct DatalinkEntry {
    access_url: String,
}

/// Catalog client speaking the archive's async TAP protocol.
pub struct TapClient {
    client: reqwest::Client,
    base_url: Url,
    poll_interval: Duration,
    poll_budget: Duration,
}

impl TapClient {
    /// Create a client with default polling settings
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        Self::with_polling(base_url, Duration::from_secs(2), Duration::from_secs(300))
    }

    /// Create a client with custom poll interval and total polling budget
    pub fn with_polling(
        base_url: &str,
        poll_interval: Duration,
        poll_budget: Duration,
    ) -> Result<Self, CatalogError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::Malformed(format!("invalid catalog url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            poll_interval,
            poll_budget,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::Malformed(format!("invalid endpoint {path}: {e}")))
    }

    async fn create_job(&self, adql: &str) -> Result<String, CatalogError> {
        let response = self
            .client
            .post(self.endpoint("async")?)
            .form(&[("LANG", "ADQL"), ("QUERY", adql)])
            .send()
            .await?
            .error_for_status()?;

        let created: JobCreated = response.json().await?;
        Ok(created.job_id)
    }

    async fn run_job(&self, job_id: &str) -> Result<(), CatalogError> {
        self.client
            .post(self.endpoint(&format!("async/{job_id}/phase"))?)
            .form(&[("PHASE", "RUN")])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Poll the job phase until it reaches a terminal state.
    async fn wait_for_job(&self, job_id: &str) -> Result<(), CatalogError> {
        let started = tokio::time::Instant::now();

        loop {
            let phase = self
                .client
                .get(self.endpoint(&format!("async/{job_id}/phase"))?)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            match phase.trim() {
                "COMPLETED" => return Ok(()),
                "ERROR" | "ABORTED" => {
                    return Err(CatalogError::JobFailed {
                        job_id: job_id.to_string(),
                        phase: phase.trim().to_string(),
                    })
                }
                other => {
                    debug!(job_id = %job_id, phase = %other, "Catalog job still running");
                }
            }

            if started.elapsed() >= self.poll_budget {
                return Err(CatalogError::PollTimeout(self.poll_budget));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_result(&self, job_id: &str) -> Result<FrameTable, CatalogError> {
        let response = self
            .client
            .get(self.endpoint(&format!("async/{job_id}/results/result"))?)
            .send()
            .await?
            .error_for_status()?;

        let table: FrameTable = response.json().await?;
        Ok(table)
    }
}

#[async_trait]
impl CatalogClient for TapClient {
    async fn query(&self, query: &CatalogQuery) -> Result<FrameTable, CatalogError> {
        let adql = query.to_adql();
        debug!(adql = %adql, "Submitting catalog query");

        let job_id = self.create_job(&adql).await?;
        self.run_job(&job_id).await?;
        self.wait_for_job(&job_id).await?;
        let table = self.fetch_result(&job_id).await?;

        debug!(job_id = %job_id, rows = table.len(), "Catalog query completed");
        Ok(table)
    }

    async fn data_urls(&self, table: &FrameTable) -> Result<Vec<String>, CatalogError> {
        let mut urls = Vec::with_capacity(table.len());

        for row in table.iter() {
            let mut endpoint = self.endpoint("datalink")?;
            endpoint
                .query_pairs_mut()
                .append_pair("ID", &row.publisher_id);

            let entries: Vec<DatalinkEntry> = self
                .client
                .get(endpoint)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let entry = entries.into_iter().next().ok_or_else(|| {
                CatalogError::Malformed(format!("no download url for {}", row.publisher_id))
            })?;
            urls.push(entry.access_url);
        }

        Ok(urls)
    }
}
