use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_curator::config::Config;
use iptv_curator::services::{
    catalog_merger::{persist_catalog, write_snapshot},
    classifier::{CountryClassifier, CountryTable},
    ingestor::IngestionCoordinator,
    validator::StreamValidator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing/logging
    let json = config.log_format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iptv_curator=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("Starting IPTV curator v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "{} sources, catalog {} ({})",
        config.sources.len(),
        config.catalog_path.display(),
        if config.catalog_write { "write enabled" } else { "dry run" }
    );

    if config.sources.is_empty() {
        tracing::warn!("No sources configured (IPTV_SOURCES is empty)");
    }

    let validator = StreamValidator::new(
        &config.user_agent,
        config.probe_timeout(),
        config.probe_max_redirects,
    )?;
    let classifier = CountryClassifier::new(CountryTable::builtin(), config.fallback_country.clone());
    tracing::info!(
        "Classifying against {} country codes (fallback {:?})",
        classifier.table().len(),
        classifier.fallback()
    );
    let coordinator = IngestionCoordinator::new(validator, classifier, config.ingest_options())?;

    let report = coordinator.run_with_stats(&config.sources).await;

    for (country, channels) in report.catalog.countries() {
        tracing::info!("{}: {} channels", country, channels.len());
    }
    tracing::info!(
        pairs = report.stats.pairs_seen,
        accepted = report.stats.accepted,
        unreachable = report.stats.unreachable,
        duplicates = report.stats.duplicates,
        capped = report.stats.capped,
        "Collected {} countries",
        report.catalog.country_count()
    );

    // Written before merging so a failed merge leaves the run inspectable
    if let Some(path) = &config.snapshot_path {
        if let Err(e) = write_snapshot(path, &report.catalog).await {
            tracing::warn!("Snapshot not written: {:#}", e);
        }
    }

    if !config.catalog_write {
        tracing::info!("Dry run: catalog not modified (set CATALOG_WRITE=true to persist)");
        return Ok(());
    }

    let summary = persist_catalog(&config.catalog_path, &report.catalog, &config.merge_options())
        .await
        .context("Catalog merge failed")?;

    tracing::info!(
        "Merged {} channels across {} countries into {}",
        summary.channels,
        summary.countries,
        config.catalog_path.display()
    );

    Ok(())
}
