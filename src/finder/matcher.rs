//! Role-aware frame matching
//!
//! One matcher serves all four frame roles: it runs the role's catalog query
//! through the retry budget, enforces the role's minimum count and tags the
//! surviving rows. Roles configured with a zero minimum are optional; their
//! query failures degrade to an empty table instead of aborting the run.

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::catalog::headers::HeaderStore;
use crate::catalog::query::CatalogQuery;
use crate::catalog::CatalogClient;
use crate::finder::FinderError;
use crate::models::{FrameRole, FrameTable, MatchPolicy};
use crate::utils::retry::{with_retry, RetryConfig};

/// Matches candidate frames for a single role.
pub struct FrameMatcher<'a> {
    catalog: &'a dyn CatalogClient,
}

impl<'a> FrameMatcher<'a> {
    pub fn new(catalog: &'a dyn CatalogClient) -> Self {
        Self { catalog }
    }

    /// Retrieve, validate and tag frames for `role`.
    ///
    /// Fails with [`FinderError::InsufficientData`] when fewer than
    /// `policy.min_count` rows come back, and with [`FinderError::Query`]
    /// when a required role's query keeps failing.
    pub async fn find(
        &self,
        role: FrameRole,
        query: &CatalogQuery,
        policy: &MatchPolicy,
    ) -> Result<FrameTable, FinderError> {
        debug!(role = %role, "Finding frames");

        let retry = RetryConfig::new(policy.max_tries);
        let result = with_retry(&retry, role.as_str(), || self.catalog.query(query)).await;

        let mut table = match result {
            Ok(table) => table,
            Err(source) if policy.min_count == 0 => {
                debug!(role = %role, error = %source, "Optional role query failed; returning empty table");
                FrameTable::default()
            }
            Err(source) => {
                error!(role = %role, error = %source, "Required role query failed");
                return Err(FinderError::Query { role, source });
            }
        };

        if table.len() < policy.min_count {
            return Err(FinderError::InsufficientData {
                role,
                required: policy.min_count,
                found: table.len(),
            });
        }

        debug!(role = %role, frames = table.len(), "Found frames");
        table.tag_role(role);
        Ok(table)
    }

    /// Drop rows whose frame camera differs from the science camera.
    ///
    /// Camera lives only in the per-file headers, so each candidate needs a
    /// lookup. A failed lookup skips the filter entirely rather than failing
    /// the run; the minimum count is re-checked after filtering because the
    /// secondary cut can empty out an initially sufficient candidate set.
    pub async fn filter_camera(
        &self,
        headers: &dyn HeaderStore,
        role: FrameRole,
        mut table: FrameTable,
        camera: &str,
        policy: &MatchPolicy,
    ) -> Result<FrameTable, FinderError> {
        if table.is_empty() {
            return Ok(table);
        }

        debug!(role = %role, camera = %camera, "Adding camera information to candidates");
        let lookups = join_all(
            table
                .iter()
                .map(|row| headers.camera(&row.product_id)),
        )
        .await;

        let mut cameras = Vec::with_capacity(lookups.len());
        for (row, lookup) in table.iter().zip(lookups) {
            match lookup {
                Ok(value) => cameras.push(value),
                Err(e) => {
                    warn!(
                        role = %role,
                        product_id = %row.product_id,
                        error = %e,
                        "Camera lookup failed; skipping camera filter"
                    );
                    return Ok(table);
                }
            }
        }

        let mut keep = cameras.iter().map(|c| c.as_str() == camera);
        table.retain(|_| keep.next().unwrap_or(false));
        debug!(role = %role, frames = table.len(), "Frames remain after matching camera");

        if table.len() < policy.min_count {
            return Err(FinderError::InsufficientData {
                role,
                required: policy.min_count,
                found: table.len(),
            });
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::headers::HeaderError;
    use crate::catalog::CatalogError;
    use crate::models::test_frame;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Catalog stub answering from a queue of canned responses
    struct StubCatalog {
        responses: Mutex<Vec<Result<FrameTable, CatalogError>>>,
        calls: AtomicU32,
    }

    impl StubCatalog {
        fn new(responses: Vec<Result<FrameTable, CatalogError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }

        fn always_failing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl CatalogClient for StubCatalog {
        async fn query(&self, _query: &CatalogQuery) -> Result<FrameTable, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(CatalogError::Malformed("stub exhausted".to_string()))
            } else {
                responses.remove(0)
            }
        }

        async fn data_urls(&self, _table: &FrameTable) -> Result<Vec<String>, CatalogError> {
            Ok(Vec::new())
        }
    }

    /// Header stub with fixed camera values per product id
    struct StubHeaders {
        cameras: HashMap<String, String>,
        fail_for: Option<String>,
    }

    impl StubHeaders {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                cameras: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fail_for: None,
            }
        }
    }

    #[async_trait]
    impl HeaderStore for StubHeaders {
        async fn camera(&self, product_id: &str) -> Result<String, HeaderError> {
            if self.fail_for.as_deref() == Some(product_id) {
                return Err(HeaderError::CardMissing {
                    product_id: product_id.to_string(),
                });
            }
            self.cameras
                .get(product_id)
                .cloned()
                .ok_or_else(|| HeaderError::CardMissing {
                    product_id: product_id.to_string(),
                })
        }
    }

    fn policy(min_count: usize) -> MatchPolicy {
        MatchPolicy {
            min_count,
            max_tries: 1,
        }
    }

    #[tokio::test]
    async fn test_find_tags_rows() {
        let catalog = StubCatalog::new(vec![Ok(FrameTable::new(vec![test_frame(
            "N1",
            "GN-CAL20190404-10-001",
            58000.0,
        )]))]);
        let matcher = FrameMatcher::new(&catalog);

        let table = matcher
            .find(FrameRole::Flat, &CatalogQuery::new(), &policy(1))
            .await
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].role, Some(FrameRole::Flat));
    }

    #[tokio::test]
    async fn test_find_enforces_min_count() {
        let catalog = StubCatalog::new(vec![Ok(FrameTable::new(vec![test_frame(
            "N1",
            "GN-CAL20190404-10-001",
            58000.0,
        )]))]);
        let matcher = FrameMatcher::new(&catalog);

        let err = matcher
            .find(FrameRole::Flat, &CatalogQuery::new(), &policy(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinderError::InsufficientData {
                role: FrameRole::Flat,
                required: 2,
                found: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_optional_role_swallows_query_failure() {
        let catalog = StubCatalog::always_failing();
        let matcher = FrameMatcher::new(&catalog);

        let table = matcher
            .find(
                FrameRole::Shortdark,
                &CatalogQuery::new(),
                &MatchPolicy {
                    min_count: 0,
                    max_tries: 3,
                },
            )
            .await
            .unwrap();
        assert!(table.is_empty());
        // The retry budget was still spent before degrading
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_required_role_escalates_query_failure() {
        let catalog = StubCatalog::always_failing();
        let matcher = FrameMatcher::new(&catalog);

        let err = matcher
            .find(
                FrameRole::Flat,
                &CatalogQuery::new(),
                &MatchPolicy {
                    min_count: 1,
                    max_tries: 2,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FinderError::Query { role: FrameRole::Flat, .. }));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_camera_filter_rechecks_min_count() {
        let catalog = StubCatalog::always_failing();
        let matcher = FrameMatcher::new(&catalog);
        let headers = StubHeaders::new(&[("N1", "f6"), ("N2", "f32")]);

        let table = FrameTable::new(vec![
            test_frame("N1", "GN-CAL20190404-10-001", 58000.0),
            test_frame("N2", "GN-CAL20190404-10-002", 58000.0),
        ]);

        // Two candidates met min_flats = 2, but only one survives the camera
        // cut, so the invariant is now violated.
        let err = matcher
            .filter_camera(&headers, FrameRole::Flat, table, "f6", &policy(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinderError::InsufficientData {
                required: 2,
                found: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_camera_filter_keeps_matching_rows() {
        let catalog = StubCatalog::always_failing();
        let matcher = FrameMatcher::new(&catalog);
        let headers = StubHeaders::new(&[("N1", "f6"), ("N2", "f32")]);

        let table = FrameTable::new(vec![
            test_frame("N1", "GN-CAL20190404-10-001", 58000.0),
            test_frame("N2", "GN-CAL20190404-10-002", 58000.0),
        ]);

        let out = matcher
            .filter_camera(&headers, FrameRole::Flat, table, "f6", &policy(1))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].product_id, "N1");
    }

    #[tokio::test]
    async fn test_camera_lookup_failure_skips_filter() {
        let catalog = StubCatalog::always_failing();
        let matcher = FrameMatcher::new(&catalog);
        let mut headers = StubHeaders::new(&[("N1", "f6")]);
        headers.fail_for = Some("N2".to_string());

        let table = FrameTable::new(vec![
            test_frame("N1", "GN-CAL20190404-10-001", 58000.0),
            test_frame("N2", "GN-CAL20190404-10-002", 58000.0),
        ]);

        // Lookup failure leaves the candidate set unfiltered
        let out = matcher
            .filter_camera(&headers, FrameRole::Flat, table, "f6", &policy(2))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }
}
