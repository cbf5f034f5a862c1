//! Folds a run's catalog into the persisted catalog document
//!
//! The document is a source file holding a country-keyed object literal.
//! New country blocks are inserted right before a known anchor entry; the
//! rest of the document is kept byte for byte. Writes go through a temp
//! file and a rename so readers never observe a partial document.

use anyhow::Context;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::models::{Catalog, Channel, DEFAULT_CATEGORY};

/// Entry the new blocks are inserted in front of
pub const DEFAULT_ANCHOR: &str = "\"South Africa\":";

/// Channels kept per country when merging
pub const DEFAULT_MERGE_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("anchor {anchor} not found in catalog document")]
    AnchorNotFound { anchor: String },

    #[error("failed to read catalog {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write catalog {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode channel record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted shape of one channel
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRecord<'a> {
    name: &'a str,
    url: &'a str,
    category: &'a str,
    logo: &'a str,
    country_name: &'a str,
}

impl<'a> From<&'a Channel> for CatalogRecord<'a> {
    fn from(channel: &'a Channel) -> Self {
        let category = if channel.category().is_empty() {
            DEFAULT_CATEGORY
        } else {
            channel.category()
        };

        Self {
            name: channel.name(),
            url: channel.url(),
            category,
            logo: channel.logo().unwrap_or(""),
            country_name: channel.country_name(),
        }
    }
}

/// Where and how a merge is written
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub anchor: String,
    pub limit: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            anchor: DEFAULT_ANCHOR.to_string(),
            limit: DEFAULT_MERGE_LIMIT,
        }
    }
}

/// What a successful merge changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub countries: usize,
    pub channels: usize,
}

/// Render the country blocks inserted into the document
fn render_blocks(incoming: &Catalog, limit: usize) -> Result<(String, MergeSummary), MergeError> {
    let mut rendered = String::new();
    let mut summary = MergeSummary {
        countries: 0,
        channels: 0,
    };

    for (country, channels) in incoming.countries() {
        let records = channels
            .iter()
            .take(limit)
            .map(|c| serde_json::to_string(&CatalogRecord::from(c)).map(|json| format!("    {}", json)))
            .collect::<Result<Vec<_>, _>>()?;

        if records.is_empty() {
            continue;
        }

        rendered.push_str(&format!("\n  {}: [\n", serde_json::to_string(country)?));
        rendered.push_str(&records.join(",\n"));
        rendered.push_str("\n  ],");

        summary.countries += 1;
        summary.channels += records.len();
    }

    Ok((rendered, summary))
}

/// Insert the incoming catalog before the anchor of `existing`
///
/// Each country contributes at most `limit` channels. Every other byte of
/// `existing` is preserved. Fails without producing output when the anchor
/// is missing.
pub fn merge_catalog(
    existing: &str,
    incoming: &Catalog,
    anchor: &str,
    limit: usize,
) -> Result<(String, MergeSummary), MergeError> {
    let insert_at = existing
        .find(anchor)
        .ok_or_else(|| MergeError::AnchorNotFound {
            anchor: anchor.to_string(),
        })?;

    let (blocks, summary) = render_blocks(incoming, limit)?;
    if blocks.is_empty() {
        return Ok((existing.to_string(), summary));
    }

    let mut merged = String::with_capacity(existing.len() + blocks.len() + 4);
    merged.push_str(&existing[..insert_at]);
    merged.push_str(&blocks);
    merged.push_str("\n\n  ");
    merged.push_str(&existing[insert_at..]);

    Ok((merged, summary))
}

/// Merge into the document at `path` and replace it atomically
///
/// On any error the file on disk is left untouched.
pub async fn persist_catalog(
    path: &Path,
    incoming: &Catalog,
    options: &MergeOptions,
) -> Result<MergeSummary, MergeError> {
    let existing = fs::read_to_string(path)
        .await
        .map_err(|source| MergeError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let (merged, summary) = merge_catalog(&existing, incoming, &options.anchor, options.limit)?;

    write_atomic(path, merged.as_bytes())
        .await
        .map_err(|source| MergeError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        "Catalog {} updated: {} channels in {} countries (sha1 {} -> {})",
        path.display(),
        summary.channels,
        summary.countries,
        content_digest(existing.as_bytes()),
        content_digest(merged.as_bytes())
    );

    Ok(summary)
}

/// JSON dump of a run's catalog
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogSnapshot<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    catalog: &'a Catalog,
}

/// Write the full accumulated catalog as pretty JSON
pub async fn write_snapshot(path: &Path, catalog: &Catalog) -> anyhow::Result<()> {
    let snapshot = CatalogSnapshot {
        generated_at: chrono::Utc::now(),
        catalog,
    };
    let content = serde_json::to_string_pretty(&snapshot)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    write_atomic(path, content.as_bytes())
        .await
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    info!("Snapshot written to {}", path.display());
    Ok(())
}

/// Write to a sibling temp file, sync, then rename over `path`
async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp_path = tmp_path_for(path);

    let result = async {
        let mut file = File::create(&tmp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }

    result
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// SHA1 of a document, hex encoded
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParsedChannelInfo;

    const DOCUMENT: &str = "export const channels = {\n  \"Egypt\": [\n    { \"name\": \"Old\", \"url\": \"http://old\" }\n  ],\n  \"South Africa\": [\n  ],\n};\n";

    fn channel(name: &str, url: &str, country: &str, logo: Option<&str>) -> Channel {
        let info = ParsedChannelInfo {
            name: name.to_string(),
            logo_url: logo.map(|l| l.to_string()),
            ..Default::default()
        };
        Channel::from_parsed(info, url, country.to_string()).unwrap()
    }

    #[test]
    fn test_merge_inserts_before_anchor() {
        let mut catalog = Catalog::default();
        catalog.insert(channel("2M TV", "http://example.com/2m.m3u8", "Morocco", Some("http://l/2m.png")));

        let (merged, summary) = merge_catalog(DOCUMENT, &catalog, DEFAULT_ANCHOR, DEFAULT_MERGE_LIMIT).unwrap();

        let morocco = merged.find("\"Morocco\": [").unwrap();
        let anchor = merged.find(DEFAULT_ANCHOR).unwrap();
        assert!(morocco < anchor);
        assert!(merged.contains(
            r#"{"name":"2M TV","url":"http://example.com/2m.m3u8","category":"General","logo":"http://l/2m.png","countryName":"Morocco"}"#
        ));
        // Prior content preserved verbatim
        assert!(merged.starts_with(&DOCUMENT[..DOCUMENT.find(DEFAULT_ANCHOR).unwrap()]));
        assert!(merged.ends_with(&DOCUMENT[DOCUMENT.find(DEFAULT_ANCHOR).unwrap()..]));
        assert_eq!(summary, MergeSummary { countries: 1, channels: 1 });
    }

    #[test]
    fn test_merge_truncates_each_country() {
        let mut catalog = Catalog::default();
        for i in 0..15 {
            catalog.insert(channel(&format!("C{i}"), &format!("http://x/{i}"), "Iraq", None));
        }

        let (merged, summary) = merge_catalog(DOCUMENT, &catalog, DEFAULT_ANCHOR, DEFAULT_MERGE_LIMIT).unwrap();

        assert_eq!(summary.channels, 10);
        assert_eq!(merged.matches("\"countryName\":\"Iraq\"").count(), 10);
        assert!(merged.contains("\"name\":\"C9\""));
        assert!(!merged.contains("\"name\":\"C10\""));
        assert!(merged.contains("\"logo\":\"\""));
    }

    #[test]
    fn test_merge_escapes_strings() {
        let mut catalog = Catalog::default();
        catalog.insert(channel("Say \"Hi\"", "http://x/q", "Oman", None));

        let (merged, _) = merge_catalog(DOCUMENT, &catalog, DEFAULT_ANCHOR, DEFAULT_MERGE_LIMIT).unwrap();
        assert!(merged.contains(r#""name":"Say \"Hi\"""#));
    }

    #[test]
    fn test_merge_without_anchor_fails() {
        let catalog = Catalog::default();
        let err = merge_catalog("{}", &catalog, DEFAULT_ANCHOR, DEFAULT_MERGE_LIMIT).unwrap_err();

        assert!(matches!(err, MergeError::AnchorNotFound { .. }));
    }

    #[test]
    fn test_merge_empty_catalog_is_noop() {
        let (merged, summary) =
            merge_catalog(DOCUMENT, &Catalog::default(), DEFAULT_ANCHOR, DEFAULT_MERGE_LIMIT).unwrap();

        assert_eq!(merged, DOCUMENT);
        assert_eq!(summary.channels, 0);
    }

    #[tokio::test]
    async fn test_persist_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iptv-channels.ts");
        std::fs::write(&path, DOCUMENT).unwrap();

        let mut catalog = Catalog::default();
        catalog.insert(channel("Al Aoula", "http://x/aoula", "Morocco", None));

        let summary = persist_catalog(&path, &catalog, &MergeOptions::default()).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Al Aoula"));
        assert_eq!(summary.channels, 1);
        assert!(!tmp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_persist_missing_anchor_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iptv-channels.ts");
        let original = "export const channels = {\n  \"Egypt\": [],\n};\n";
        std::fs::write(&path, original).unwrap();
        let before = content_digest(&std::fs::read(&path).unwrap());

        let mut catalog = Catalog::default();
        catalog.insert(channel("Al Aoula", "http://x/aoula", "Morocco", None));

        let err = persist_catalog(&path, &catalog, &MergeOptions::default()).await.unwrap_err();

        assert!(matches!(err, MergeError::AnchorNotFound { .. }));
        assert_eq!(content_digest(&std::fs::read(&path).unwrap()), before);
        assert!(!tmp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_persist_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ts");

        let err = persist_catalog(&path, &Catalog::default(), &MergeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::Read { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_snapshot_contains_countries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("snapshot.json");

        let mut catalog = Catalog::default();
        catalog.insert(channel("Al Aoula", "http://x/aoula", "Morocco", None));
        write_snapshot(&path, &catalog).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["countries"]["Morocco"][0]["name"], "Al Aoula");
        assert!(json["generatedAt"].is_string());
    }

    #[test]
    fn test_content_digest() {
        let digest = content_digest(b"catalog");
        assert_eq!(digest.len(), 40);
        assert_ne!(digest, content_digest(b"catalog "));
    }
}
