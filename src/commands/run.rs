//! `run` command: full pipeline, discovery through reduction

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::catalog::headers::ArchiveHeaderClient;
use crate::catalog::TapClient;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::finder::Finder;
use crate::models::ProductSet;
use crate::reducer::{CommandEngine, Reducer};

pub async fn run(config: Config, obs_name: String) -> Result<()> {
    let started = chrono::Utc::now();
    let work_dir = std::env::current_dir().context("Failed to resolve working directory")?;

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

    // Discovery
    let mut finder = Finder::new(
        catalog.clone(),
        headers,
        config.datafinder.clone(),
        &obs_name,
    )?;
    let frames = finder.run().await?;

    // Retrieval
    let downloader = Downloader::new(catalog, &config.dataretrieval, &work_dir)?;
    let summary = downloader.fetch_all(&frames).await?;
    if summary.downloaded == 0 {
        anyhow::bail!("No frames downloaded for {obs_name}");
    }

    // Reduction
    let engine = Arc::new(CommandEngine::new(&config.reduction.engine));
    let reducer = Reducer::new(
        engine,
        config.datafinder,
        config.reduction,
        downloader.download_path(),
    );
    let products = reducer.run(&frames).await?;

    print_report(&obs_name, &products, started);
    Ok(())
}

fn print_report(obs_name: &str, products: &ProductSet, started: chrono::DateTime<chrono::Utc>) {
    let elapsed = chrono::Utc::now() - started;
    println!("Reduction of {obs_name} finished in {}s", elapsed.num_seconds());
    println!("====================================");
    print_product("stack", products.stack.as_deref());
    print_product("flat", products.flat.as_deref());
    print_product("dark", products.dark.as_deref());
    print_product("bpm", products.bpm.as_deref());
}

fn print_product(name: &str, path: Option<&Path>) {
    match path {
        Some(path) => println!("  {:5} {}", name, path.display()),
        None => println!("  {name:5} (skipped)"),
    }
}
