//! `find` command: data discovery without downloading anything

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::headers::ArchiveHeaderClient;
use crate::catalog::TapClient;
use crate::config::Config;
use crate::finder::Finder;
use crate::models::{FrameRole, FrameTable};

pub async fn find(config: Config, obs_name: String, output: Option<PathBuf>) -> Result<()> {
    let catalog = Arc::new(
        TapClient::new(&config.services.tap_url).context("Failed to create catalog client")?,
    );
    let headers = Arc::new(
        ArchiveHeaderClient::new(
            &config.services.data_url,
            config.dataretrieval.requests_per_second,
        )
        .context("Failed to create header client")?,
    );

    let mut finder = Finder::new(catalog, headers, config.datafinder, &obs_name)?;
    let frames = finder.run().await?;

    print_summary(&obs_name, &frames);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&frames)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Frame table written to {}", path.display());
    }

    Ok(())
}

fn print_summary(obs_name: &str, frames: &FrameTable) {
    println!("Data discovery for {obs_name}");
    println!("=============================");
    for role in FrameRole::all() {
        println!("  {:9} {:4} frames", role, frames.with_role(role).count());
    }
    println!("  total     {:4} frames", frames.len());
}
