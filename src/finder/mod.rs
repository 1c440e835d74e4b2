//! Data discovery for one NIRI stack
//!
//! Given a science observation name, the finder locates the science frames
//! plus the calibration frames a reduction needs: flat fields, long darks
//! (darks with the science integration time) and optional short darks
//! (~1 second darks used to build a fresh bad pixel mask).
//!
//! Discovery is strictly sequential: the object frames must resolve first
//! because every calibration predicate depends on metadata derived from
//! them (bandpass, integration time, time midpoint, camera).

pub mod matcher;
pub mod segment;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::catalog::headers::{HeaderError, HeaderStore};
use crate::catalog::query::{CatalogQuery, ExposureFilter, ObservationType};
use crate::catalog::{CatalogClient, CatalogError};
use crate::config::DatafinderConfig;
use crate::models::{FrameRole, FrameTable, MatchPolicy, StackContext};
use matcher::FrameMatcher;
use segment::segment;

/// Calibration frames are matched within this many days of the science
/// midpoint, on either side.
const CALIBRATION_WINDOW_DAYS: f64 = 2.0;

/// Long darks must match the science integration time within this many
/// seconds. The archive records exposure times as floats, so exact equality
/// would be fragile.
const LONGDARK_EXPOSURE_TOLERANCE: f64 = 0.01;

/// Short darks are ~1 second exposures inside this inclusive range.
const SHORTDARK_EXPOSURE_RANGE: (f64, f64) = (0.99, 1.01);

/// Errors from the data discovery subsystem
#[derive(Error, Debug)]
pub enum FinderError {
    /// Required configuration or stack name missing or malformed
    #[error("invalid finder configuration: {0}")]
    Config(String),

    /// A required role's query kept failing after all retries
    #[error("{role} query failed: {source}")]
    Query {
        role: FrameRole,
        #[source]
        source: CatalogError,
    },

    /// Fewer frames than the configured minimum survived matching
    #[error("required {required} {role} frames; found {found}")]
    InsufficientData {
        role: FrameRole,
        required: usize,
        found: usize,
    },

    /// The science camera could not be read from the frame headers
    #[error("camera lookup for {product_id} failed")]
    Metadata {
        product_id: String,
        #[source]
        source: HeaderError,
    },
}

/// Finds all data for a given NIRI stack.
pub struct Finder {
    catalog: Arc<dyn CatalogClient>,
    headers: Arc<dyn HeaderStore>,
    config: DatafinderConfig,
    context: StackContext,
}

impl std::fmt::Debug for Finder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finder")
            .field("config", &self.config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Finder {
    /// Validate configuration and set up a discovery run for `obs_name`.
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        headers: Arc<dyn HeaderStore>,
        config: DatafinderConfig,
        obs_name: &str,
    ) -> Result<Self, FinderError> {
        if config.max_tries == 0 {
            return Err(FinderError::Config(
                "max_tries must be at least 1".to_string(),
            ));
        }
        let context = StackContext::for_stack(obs_name).ok_or_else(|| {
            FinderError::Config(format!(
                "observation name {obs_name:?} has no sequence component"
            ))
        })?;

        debug!(stack = %context.obs_name, "Stack name");
        debug!(min_objects = config.effective_min_objects(), "Min required object frames");
        debug!(min_flats = config.min_flats, "Min required flat frames");
        debug!(min_longdarks = config.min_longdarks, "Min required longdark frames");
        debug!(min_shortdarks = config.min_shortdarks, "Min required shortdark frames");

        Ok(Self {
            catalog,
            headers,
            config,
            context,
        })
    }

    /// Reference metadata derived from the science frames.
    ///
    /// Only meaningful after [`Finder::run`] has completed.
    pub fn context(&self) -> &StackContext {
        &self.context
    }

    /// Run the full discovery sequence.
    ///
    /// Science frames resolve first and populate the stack context; each
    /// calibration role is then matched and segmented down to the batch
    /// closest in time. The result is the row-wise union of all four tagged
    /// tables.
    pub async fn run(&mut self) -> Result<FrameTable, FinderError> {
        let mut result = self.find_objects().await?;

        let flats = segment(self.find_flats().await?, self.context.mjd_date);
        let longdarks = segment(self.find_longdarks().await?, self.context.mjd_date);
        let shortdarks = segment(self.find_shortdarks().await?, self.context.mjd_date);

        result.stack(flats);
        result.stack(longdarks);
        result.stack(shortdarks);

        info!(
            stack = %self.context.obs_name,
            frames = result.len(),
            "Data discovery finished"
        );
        Ok(result)
    }

    fn policy(&self, min_count: usize) -> MatchPolicy {
        MatchPolicy {
            min_count,
            max_tries: self.config.max_tries,
        }
    }

    /// Find science frames and derive the calibration-matching context.
    ///
    /// Science frames are never optional: any failure here aborts the run.
    async fn find_objects(&mut self) -> Result<FrameTable, FinderError> {
        let matcher = FrameMatcher::new(self.catalog.as_ref());
        let query = CatalogQuery::new().observation_prefix(&self.context.obs_name);
        let policy = self.policy(self.config.effective_min_objects());

        let table = match matcher.find(FrameRole::Object, &query, &policy).await {
            Ok(table) => table,
            Err(e) => {
                error!(stack = %self.context.obs_name, "Failed to find object frames");
                return Err(e);
            }
        };

        self.populate_context(&table).await?;
        Ok(table)
    }

    /// Fill the stack context from the object-frame result.
    ///
    /// Rows of one observation are homogeneous in filter and exposure, so
    /// the first row supplies both. The time midpoint averages the first and
    /// last frame start times. Camera is not in the catalog and comes from
    /// the frame headers.
    async fn populate_context(&mut self, table: &FrameTable) -> Result<(), FinderError> {
        let rows = table.rows();
        let (first, last) = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(FinderError::InsufficientData {
                    role: FrameRole::Object,
                    required: self.config.effective_min_objects(),
                    found: 0,
                })
            }
        };

        self.context.bandpass = first.bandpass.clone();
        self.context.exposure_time = first.exposure_time;
        self.context.mjd_date = (first.time_lower + last.time_lower) / 2.0;

        self.context.camera = self
            .headers
            .camera(&first.product_id)
            .await
            .map_err(|source| {
                error!(
                    product_id = %first.product_id,
                    "Failed to set stack metadata from objects"
                );
                FinderError::Metadata {
                    product_id: first.product_id.clone(),
                    source,
                }
            })?;

        debug!(
            bandpass = %self.context.bandpass,
            exposure_time = self.context.exposure_time,
            mjd_date = self.context.mjd_date,
            camera = %self.context.camera,
            "Stack context populated"
        );
        Ok(())
    }

    /// Find flat frames matching the science bandpass and camera.
    async fn find_flats(&self) -> Result<FrameTable, FinderError> {
        let matcher = FrameMatcher::new(self.catalog.as_ref());
        let query = CatalogQuery::new()
            .observation_type(ObservationType::Flat)
            .within_days(self.context.mjd_date, CALIBRATION_WINDOW_DAYS)
            .bandpass(&self.context.bandpass);
        let policy = self.policy(self.config.min_flats);

        let table = matcher.find(FrameRole::Flat, &query, &policy).await?;

        // NIRI has three cameras; flats taken with a different camera than
        // the science frames are useless for this stack.
        matcher
            .filter_camera(
                self.headers.as_ref(),
                FrameRole::Flat,
                table,
                &self.context.camera,
                &policy,
            )
            .await
    }

    /// Find darks with the science integration time.
    async fn find_longdarks(&self) -> Result<FrameTable, FinderError> {
        let matcher = FrameMatcher::new(self.catalog.as_ref());
        let query = CatalogQuery::new()
            .observation_type(ObservationType::Dark)
            .within_days(self.context.mjd_date, CALIBRATION_WINDOW_DAYS)
            .exposure(ExposureFilter::Near {
                seconds: self.context.exposure_time,
                tolerance: LONGDARK_EXPOSURE_TOLERANCE,
            });

        matcher
            .find(FrameRole::Longdark, &query, &self.policy(self.config.min_longdarks))
            .await
    }

    /// Find ~1 second darks for bad pixel mask construction.
    async fn find_shortdarks(&self) -> Result<FrameTable, FinderError> {
        let matcher = FrameMatcher::new(self.catalog.as_ref());
        let (lower, upper) = SHORTDARK_EXPOSURE_RANGE;
        let query = CatalogQuery::new()
            .observation_type(ObservationType::Dark)
            .within_days(self.context.mjd_date, CALIBRATION_WINDOW_DAYS)
            .exposure(ExposureFilter::Between { lower, upper });

        matcher
            .find(FrameRole::Shortdark, &query, &self.policy(self.config.min_shortdarks))
            .await
    }
}
