use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{Source, DEFAULT_MAX_PER_COUNTRY};
use crate::services::catalog_merger::{MergeOptions, DEFAULT_ANCHOR, DEFAULT_MERGE_LIMIT};
use crate::services::classifier::DEFAULT_FALLBACK_COUNTRY;
use crate::services::ingestor::IngestOptions;

const DEFAULT_SOURCES: &str =
    "iptv-org=https://raw.githubusercontent.com/iptv-org/iptv/master/index.m3u";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Sources
    pub sources: Vec<Source>,
    pub source_delay_ms: u64,

    // Fetching
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
    pub max_m3u_size_mb: u64,

    // Probing
    pub probe_timeout_ms: u64,
    pub probe_max_redirects: usize,

    // Catalog
    pub catalog_path: PathBuf,
    pub catalog_anchor: String,
    /// Dry run unless explicitly enabled
    pub catalog_write: bool,
    pub snapshot_path: Option<PathBuf>,
    pub max_channels_per_country: usize,
    pub merge_channels_per_country: usize,
    pub fallback_country: String,

    // Misc
    pub user_agent: String,
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Sources
            sources: parse_sources(
                &env::var("IPTV_SOURCES").unwrap_or_else(|_| DEFAULT_SOURCES.to_string()),
            ),
            source_delay_ms: env::var("SOURCE_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),

            // Fetching
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000), // 30 seconds, large playlists

            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),

            max_m3u_size_mb: env::var("MAX_M3U_SIZE_MB")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),

            // Probing
            probe_timeout_ms: env::var("PROBE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),

            probe_max_redirects: env::var("PROBE_MAX_REDIRECTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Catalog
            catalog_path: env::var("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("shared").join("iptv-channels.ts")),
            catalog_anchor: env::var("CATALOG_ANCHOR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ANCHOR.to_string()),
            catalog_write: env::var("CATALOG_WRITE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            snapshot_path: env::var("CATALOG_SNAPSHOT_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            // Both limits may only be lowered
            max_channels_per_country: parse_limit(
                env::var("MAX_CHANNELS_PER_COUNTRY").ok().as_deref(),
                DEFAULT_MAX_PER_COUNTRY,
            ),
            merge_channels_per_country: parse_limit(
                env::var("MERGE_CHANNELS_PER_COUNTRY").ok().as_deref(),
                DEFAULT_MERGE_LIMIT,
            ),
            fallback_country: env::var("FALLBACK_COUNTRY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FALLBACK_COUNTRY.to_string()),

            // Misc - some playlist hosts reject default client identifiers
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| format!("iptv-curator/{}", env!("CARGO_PKG_VERSION"))),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            user_agent: self.user_agent.clone(),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            max_retries: self.max_retries,
            max_playlist_bytes: self.max_m3u_size_mb.saturating_mul(1024 * 1024),
            source_delay: Duration::from_millis(self.source_delay_ms),
            max_per_country: self.max_channels_per_country,
        }
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            anchor: self.catalog_anchor.clone(),
            limit: self.merge_channels_per_country,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Parse `label=url` pairs separated by commas; a bare URL is its own label
pub fn parse_sources(raw: &str) -> Vec<Source> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            // "=" inside a query string belongs to the URL
            Some((label, url)) if !label.contains("://") => {
                let url = url.trim();
                (!url.is_empty()).then(|| Source::new(label.trim(), url))
            }
            _ => Some(Source::new(entry, entry)),
        })
        .collect()
}

/// Parse a per-country limit, never exceeding `max`
fn parse_limit(value: Option<&str>, max: usize) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(max)
        .min(max)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Catalog, Channel, ParsedChannelInfo};
    use crate::services::catalog_merger::merge_catalog;

    #[test]
    fn test_parse_sources_labels() {
        let sources = parse_sources(
            "arabic=https://example.com/ar.m3u, https://example.com/plain.m3u?x=1 ,,",
        );

        assert_eq!(
            sources,
            vec![
                Source::new("arabic", "https://example.com/ar.m3u"),
                Source::new("https://example.com/plain.m3u?x=1", "https://example.com/plain.m3u?x=1"),
            ]
        );
    }

    #[test]
    fn test_parse_sources_skips_empty_url() {
        assert!(parse_sources("label=").is_empty());
        assert_eq!(parse_sources(DEFAULT_SOURCES)[0].label, "iptv-org");
    }

    #[test]
    fn test_limits_cannot_exceed_defaults() {
        assert_eq!(parse_limit(Some("80"), DEFAULT_MAX_PER_COUNTRY), 50);
        assert_eq!(parse_limit(Some("80"), DEFAULT_MERGE_LIMIT), 10);
        assert_eq!(parse_limit(Some(" 3 "), DEFAULT_MAX_PER_COUNTRY), 3);
        assert_eq!(parse_limit(Some("lots"), DEFAULT_MERGE_LIMIT), 10);
        assert_eq!(parse_limit(None, DEFAULT_MAX_PER_COUNTRY), 50);
    }

    #[test]
    fn test_oversized_limit_keeps_catalog_and_merge_bounded() {
        let max_per_country = parse_limit(Some("80"), DEFAULT_MAX_PER_COUNTRY);
        let merge_limit = parse_limit(Some("80"), DEFAULT_MERGE_LIMIT);

        let mut catalog = Catalog::new(max_per_country);
        for i in 0..70 {
            let info = ParsedChannelInfo {
                name: format!("Iraq {i}"),
                ..Default::default()
            };
            let channel = Channel::from_parsed(info, &format!("http://iq.example/{i}"), "Iraq".into());
            catalog.insert(channel.unwrap());
        }
        assert_eq!(catalog.get("Iraq").unwrap().len(), 50);

        let existing = "const CHANNELS = {\n  \"South Africa\": [],\n};\n";
        let (_, summary) = merge_catalog(existing, &catalog, DEFAULT_ANCHOR, merge_limit).unwrap();
        assert_eq!(summary.channels, 10);
    }

    #[test]
    fn test_playlist_size_limit_saturates() {
        let config = Config {
            max_m3u_size_mb: u64::MAX,
            ..Config::from_env()
        };

        assert_eq!(config.ingest_options().max_playlist_bytes, u64::MAX);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
