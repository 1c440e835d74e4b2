//! Driving the external reduction engine
//!
//! The reduction algorithms live in an external engine invoked per product.
//! The reducer's job is bookkeeping: select the input frames for each
//! product from the tagged discovery table, skip products whose source role
//! is configured optional with a zero minimum, thread the freshly built bad
//! pixel mask into later steps, and collect the output paths.
//!
//! Products are built in dependency order: dark, bad pixel mask, flat, then
//! the science stack.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{DatafinderConfig, ReductionConfig};
use crate::models::{FrameRole, FrameTable, ProductSet};

/// Errors from the reduction boundary
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("failed to invoke reduction engine: {0}")]
    Io(#[from] std::io::Error),

    #[error("reduction engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    #[error("reduction engine produced no output path")]
    NoOutput,
}

/// One engine invocation.
#[derive(Debug, Clone)]
pub struct ReduceRequest {
    /// Input frame paths
    pub files: Vec<PathBuf>,

    /// Engine recipe override, e.g. "makeProcessedBPM"
    pub recipe: Option<String>,

    /// Bad pixel mask to apply during processing
    pub user_bpm: Option<PathBuf>,

    /// Whether the engine should dark-correct
    pub dark_correction: bool,

    /// Log file the engine writes
    pub logfile: PathBuf,
}

/// Opaque reduction engine returning the path of the product it built.
#[async_trait]
pub trait ReductionEngine: Send + Sync {
    async fn reduce(&self, request: &ReduceRequest) -> Result<PathBuf, ReduceError>;
}

/// Production engine: runs the configured executable as a subprocess and
/// reads the product path from its last line of stdout.
pub struct CommandEngine {
    program: PathBuf,
}

impl CommandEngine {
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
        }
    }
}

#[async_trait]
impl ReductionEngine for CommandEngine {
    async fn reduce(&self, request: &ReduceRequest) -> Result<PathBuf, ReduceError> {
        let mut command = tokio::process::Command::new(&self.program);
        command.arg("--logfile").arg(&request.logfile);
        if let Some(recipe) = &request.recipe {
            command.arg("--recipe").arg(recipe);
        }
        if let Some(bpm) = &request.user_bpm {
            command.arg("--user-bpm").arg(bpm);
        }
        if !request.dark_correction {
            command.arg("--no-dark-correction");
        }
        command.args(&request.files);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(program = %self.program.display(), files = request.files.len(), "Invoking reduction engine");
        let output = command.output().await?;

        if !output.status.success() {
            return Err(ReduceError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(ReduceError::NoOutput)?;
        Ok(PathBuf::from(path))
    }
}

/// Builds the processed products for one stack.
pub struct Reducer {
    engine: Arc<dyn ReductionEngine>,
    datafinder: DatafinderConfig,
    reduction: ReductionConfig,
    raw_data_path: PathBuf,
}

impl Reducer {
    pub fn new(
        engine: Arc<dyn ReductionEngine>,
        datafinder: DatafinderConfig,
        reduction: ReductionConfig,
        raw_data_path: &Path,
    ) -> Self {
        Self {
            engine,
            datafinder,
            reduction,
            raw_data_path: raw_data_path.to_path_buf(),
        }
    }

    /// Build all products for the tagged frame table.
    pub async fn run(&self, table: &FrameTable) -> Result<ProductSet, ReduceError> {
        let mut products = ProductSet::default();

        if table.is_empty() {
            return Ok(products);
        }

        products.dark = self
            .make_product(
                table,
                "processed_dark",
                self.datafinder.min_longdarks,
                &[FrameRole::Longdark],
                None,
                &products,
            )
            .await?;

        products.bpm = self
            .make_product(
                table,
                "processed_bpm",
                self.datafinder.min_shortdarks,
                &[FrameRole::Flat, FrameRole::Shortdark],
                Some("makeProcessedBPM"),
                &products,
            )
            .await?;

        products.flat = self
            .make_product(
                table,
                "processed_flat",
                self.datafinder.min_flats,
                &[FrameRole::Flat],
                None,
                &products,
            )
            .await?;

        products.stack = self
            .make_product(
                table,
                "processed_stack",
                self.datafinder.effective_min_objects(),
                &[FrameRole::Object],
                None,
                &products,
            )
            .await?;

        info!(
            dark = ?products.dark,
            bpm = ?products.bpm,
            flat = ?products.flat,
            stack = ?products.stack,
            "Reduction finished"
        );
        Ok(products)
    }

    async fn make_product(
        &self,
        table: &FrameTable,
        product_name: &str,
        min_count: usize,
        roles: &[FrameRole],
        recipe: Option<&str>,
        products: &ProductSet,
    ) -> Result<Option<PathBuf>, ReduceError> {
        if min_count == 0 {
            debug!(product = product_name, "Skipping creation of product");
            return Ok(None);
        }
        debug!(product = product_name, "Starting creation of product");

        let files: Vec<PathBuf> = table
            .iter()
            .filter(|row| row.role.map_or(false, |r| roles.contains(&r)))
            .map(|row| self.raw_data_path.join(format!("{}.fits", row.product_id)))
            .collect();
        debug!(product = product_name, frames = files.len(), "Selected input frames");

        let request = ReduceRequest {
            files,
            recipe: recipe.map(str::to_string),
            user_bpm: products.bpm.clone(),
            // Dark correction is pointless when long darks were never required
            dark_correction: self.datafinder.min_longdarks > 0,
            logfile: self.reduction.logfile.clone(),
        };

        match self.engine.reduce(&request).await {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                error!(product = product_name, error = %e, "Failed to make product");
                Err(e)
            }
        }
    }
}
