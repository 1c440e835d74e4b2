//! Integration tests for the archive downloader using wiremock

use std::sync::Arc;

use async_trait::async_trait;
use md5::{Digest, Md5};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use niripipe::catalog::query::CatalogQuery;
use niripipe::catalog::{CatalogClient, CatalogError};
use niripipe::config::DataRetrievalConfig;
use niripipe::downloader::Downloader;
use niripipe::models::{FrameRecord, FrameTable};

fn frame(product_id: &str) -> FrameRecord {
    FrameRecord {
        product_id: product_id.to_string(),
        publisher_id: format!("ivo://cadc.nrc.ca/GEMINI?GN-CAL20190404-10-001/{product_id}"),
        observation_id: "GN-CAL20190404-10-001".to_string(),
        bandpass: "J".to_string(),
        exposure_time: 60.0,
        time_lower: 58000.0,
        role: None,
    }
}

/// Catalog stub resolving every frame to a fixed set of urls
struct FixedUrls {
    urls: Vec<String>,
}

#[async_trait]
impl CatalogClient for FixedUrls {
    async fn query(&self, _query: &CatalogQuery) -> Result<FrameTable, CatalogError> {
        Ok(FrameTable::default())
    }

    async fn data_urls(&self, _table: &FrameTable) -> Result<Vec<String>, CatalogError> {
        Ok(self.urls.clone())
    }
}

fn config() -> DataRetrievalConfig {
    DataRetrievalConfig {
        requests_per_second: 100,
        ..Default::default()
    }
}

fn md5_hex(body: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

#[tokio::test]
async fn test_download_verifies_checksum_and_renames() {
    let server = MockServer::start().await;
    let body = b"SIMPLE  =                    T / fits data".to_vec();

    Mock::given(method("GET"))
        .and(path("/GEM/N0001.fits"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("Content-MD5", md5_hex(&body).as_str())
                .insert_header(
                    "Content-Disposition",
                    "attachment; filename=\"N0001.fits\"",
                ),
        )
        .mount(&server)
        .await;

    let work_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(FixedUrls {
        urls: vec![format!("{}/GEM/N0001.fits", server.uri())],
    });
    let downloader = Downloader::new(catalog, &config(), work_dir.path()).unwrap();

    let table = FrameTable::new(vec![frame("N0001")]);
    let summary = downloader.fetch_all(&table).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 0);

    let final_file = downloader.download_path().join("N0001.fits");
    assert_eq!(std::fs::read(final_file).unwrap(), body);
}

#[tokio::test]
async fn test_checksum_mismatch_counts_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/GEM/N0002.fits"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"corrupted body".to_vec())
                .insert_header("Content-MD5", "00000000000000000000000000000000"),
        )
        .mount(&server)
        .await;

    let work_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(FixedUrls {
        urls: vec![format!("{}/GEM/N0002.fits", server.uri())],
    });
    let downloader = Downloader::new(catalog, &config(), work_dir.path()).unwrap();

    let table = FrameTable::new(vec![frame("N0002")]);
    let summary = downloader.fetch_all(&table).await.unwrap();

    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.failed, 1);
    // Nothing visible in the raw-data directory
    assert!(!downloader.download_path().join("N0002.fits").exists());
}

#[tokio::test]
async fn test_filename_falls_back_to_url() {
    let server = MockServer::start().await;
    let body = b"fits bytes".to_vec();

    // No Content-Disposition, no Content-MD5: filename parsed from the url,
    // checksum validation skipped with a warning
    Mock::given(method("GET"))
        .and(path("/GEM/N0003.fits"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let work_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(FixedUrls {
        urls: vec![format!("{}/GEM/N0003.fits?RUNID=abc123", server.uri())],
    });
    let downloader = Downloader::new(catalog, &config(), work_dir.path()).unwrap();

    let table = FrameTable::new(vec![frame("N0003")]);
    let summary = downloader.fetch_all(&table).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    assert!(downloader.download_path().join("N0003.fits").exists());
}

#[tokio::test]
async fn test_one_failure_does_not_sink_batch() {
    let server = MockServer::start().await;
    let body = b"good frame".to_vec();

    Mock::given(method("GET"))
        .and(path("/GEM/N0004.fits"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/GEM/N0005.fits"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let work_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(FixedUrls {
        urls: vec![
            format!("{}/GEM/N0004.fits", server.uri()),
            format!("{}/GEM/N0005.fits", server.uri()),
        ],
    });
    let downloader = Downloader::new(catalog, &config(), work_dir.path()).unwrap();

    let table = FrameTable::new(vec![frame("N0004"), frame("N0005")]);
    let summary = downloader.fetch_all(&table).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 1);
    assert!(downloader.download_path().join("N0005.fits").exists());
}
