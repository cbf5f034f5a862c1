use anyhow::{bail, Context, Result};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::models::{Catalog, Channel, InsertOutcome, ParsedChannelInfo, Source};
use crate::services::classifier::CountryClassifier;
use crate::services::m3u_parser::PlaylistScanner;
use crate::services::validator::StreamValidator;

/// Knobs for one ingestion run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub user_agent: String,
    pub fetch_timeout: Duration,
    pub max_retries: u32,
    pub max_playlist_bytes: u64,
    /// Cooldown between two sources
    pub source_delay: Duration,
    pub max_per_country: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            user_agent: format!("iptv-curator/{}", env!("CARGO_PKG_VERSION")),
            fetch_timeout: Duration::from_secs(30),
            max_retries: 2,
            max_playlist_bytes: 50 * 1024 * 1024,
            source_delay: Duration::from_secs(1),
            max_per_country: crate::models::DEFAULT_MAX_PER_COUNTRY,
        }
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub pairs_seen: usize,
    pub accepted: usize,
    pub unreachable: usize,
    pub duplicates: usize,
    pub capped: usize,
}

/// Catalog accumulated by a run, with its counters
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub catalog: Catalog,
    pub stats: RunStats,
}

/// Drives playlist sources through scan, probe, classify and accumulate
///
/// Everything runs in one sequence: a single network operation at a time
/// and one source after another, with a cooldown in between. Stream origins
/// are rate-sensitive and parallel probing gets clients blocked.
pub struct IngestionCoordinator {
    client: Client,
    validator: StreamValidator,
    classifier: CountryClassifier,
    options: IngestOptions,
}

impl IngestionCoordinator {
    pub fn new(
        validator: StreamValidator,
        classifier: CountryClassifier,
        options: IngestOptions,
    ) -> Result<Self> {
        if classifier.table().is_empty() {
            warn!("Country table is empty, every channel will be labeled {:?}", classifier.fallback());
        }

        let client = Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.fetch_timeout)
            .gzip(true)
            .build()
            .context("Failed to create playlist HTTP client")?;

        Ok(Self {
            client,
            validator,
            classifier,
            options,
        })
    }

    /// Ingest every source and return the accumulated catalog.
    /// Failed sources are skipped; an empty catalog is a valid result.
    pub async fn run(&self, sources: &[Source]) -> Catalog {
        self.run_with_stats(sources).await.catalog
    }

    pub async fn run_with_stats(&self, sources: &[Source]) -> IngestReport {
        let mut catalog = Catalog::new(self.options.max_per_country);
        let mut stats = RunStats::default();

        for (index, source) in sources.iter().enumerate() {
            info!("Processing source {}/{}: {} ({})", index + 1, sources.len(), source.label, source.url);

            match self.ingest_source(source, &mut catalog, &mut stats).await {
                Ok(()) => stats.sources_ok += 1,
                Err(e) => {
                    stats.sources_failed += 1;
                    warn!(source = %source.label, "Skipping source: {:#}", e);
                }
            }

            if index + 1 < sources.len() && !self.options.source_delay.is_zero() {
                sleep(self.options.source_delay).await;
            }
        }

        info!(
            "Run finished: {} channels across {} countries ({} sources ok, {} failed)",
            catalog.channel_count(),
            catalog.country_count(),
            stats.sources_ok,
            stats.sources_failed
        );

        IngestReport { catalog, stats }
    }

    async fn ingest_source(
        &self,
        source: &Source,
        catalog: &mut Catalog,
        stats: &mut RunStats,
    ) -> Result<()> {
        let body = self
            .fetch_playlist(&source.url)
            .await
            .context("Failed to fetch playlist")?;

        if !body.trim_start().starts_with("#EXTM3U") {
            warn!(source = %source.label, "Playlist has no #EXTM3U header, scanning anyway");
        }

        let mut scanner = PlaylistScanner::new();
        for line in body.lines() {
            if let Some((info, url)) = scanner.feed(line) {
                self.process_entry(info, &url, catalog, stats).await;
            }
        }

        Ok(())
    }

    async fn process_entry(
        &self,
        info: ParsedChannelInfo,
        url: &str,
        catalog: &mut Catalog,
        stats: &mut RunStats,
    ) {
        stats.pairs_seen += 1;
        let label = display_name(&info).to_string();
        debug!("Testing: {} ({})", label, url);

        let outcome = self.validator.probe(url).await;
        if !outcome.is_reachable() {
            stats.unreachable += 1;
            info!("Rejected: {} - {}", label, outcome);
            return;
        }

        let country = self.classifier.classify(&info);
        let Some(channel) = Channel::from_parsed(info, url, country) else {
            return;
        };

        let country = channel.country_name().to_string();
        match catalog.insert(channel) {
            InsertOutcome::Added => {
                stats.accepted += 1;
                info!("Accepted: {} ({})", label, country);
            }
            InsertOutcome::Duplicate => {
                stats.duplicates += 1;
                debug!("Duplicate: {} ({})", label, country);
            }
            InsertOutcome::CapReached => {
                stats.capped += 1;
                debug!("Country full: {} ({})", label, country);
            }
        }
    }

    /// Fetch a playlist body, retrying on 429 and network errors
    async fn fetch_playlist(&self, url: &str) -> Result<String> {
        let response = self.fetch_with_retry(url).await?;
        let max_bytes = self.options.max_playlist_bytes;

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read playlist body")?;
            if (body.len() + chunk.len()) as u64 > max_bytes {
                bail!("Playlist exceeds size limit of {} bytes", max_bytes);
            }
            body.extend_from_slice(&chunk);
        }

        info!("Playlist size: {:.2} MB", body.len() as f64 / 1024.0 / 1024.0);
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Send the request, pausing and retrying on 429 and network errors
    async fn fetch_with_retry(&self, url: &str) -> Result<Response> {
        let mut attempt = 0;

        loop {
            let retries_left = attempt < self.options.max_retries;
            let reason = match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return self.check_declared_size(resp),
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS && retries_left => {
                    "HTTP 429".to_string()
                }
                Ok(resp) => {
                    let status = resp.status();
                    bail!("HTTP {}: {}", status.as_u16(), status.canonical_reason().unwrap_or("Error"));
                }
                Err(err) if retries_left => err.to_string(),
                Err(err) => return Err(err).context("Playlist request failed"),
            };

            pause_before_retry(attempt, &reason).await;
            attempt += 1;
        }
    }

    /// Reject a response whose declared length is over the size cap
    fn check_declared_size(&self, resp: Response) -> Result<Response> {
        let limit = self.options.max_playlist_bytes;
        match resp.content_length() {
            Some(len) if len > limit => bail!(
                "Playlist too large: {:.1}MB (limit {} bytes)",
                len as f64 / 1024.0 / 1024.0,
                limit
            ),
            _ => Ok(resp),
        }
    }
}

async fn pause_before_retry(attempt: u32, reason: &str) {
    let backoff = backoff_ms(attempt);
    warn!(retry = attempt + 1, backoff_ms = backoff, "Playlist fetch failed ({}), retrying", reason);
    sleep(Duration::from_millis(backoff)).await;
}

fn backoff_ms(attempt: u32) -> u64 {
    (1u64 << attempt.min(16)).saturating_mul(500).min(10_000)
}

fn display_name(info: &ParsedChannelInfo) -> &str {
    if !info.name.is_empty() {
        &info.name
    } else {
        info.display_name.as_deref().unwrap_or("<unnamed>")
    }
}
