use serde::Serialize;
use std::collections::BTreeMap;

use super::channel::Channel;

/// Per-country cap applied while a run accumulates channels
pub const DEFAULT_MAX_PER_COUNTRY: usize = 50;

/// Result of offering a channel to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    /// Same `(name, url)` already present in the country bucket
    Duplicate,
    /// Country bucket is full; the channel was dropped
    CapReached,
}

/// Country-keyed channel collection built during one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    #[serde(rename = "countries")]
    buckets: BTreeMap<String, Vec<Channel>>,
    #[serde(skip)]
    max_per_country: usize,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_COUNTRY)
    }
}

impl Catalog {
    pub fn new(max_per_country: usize) -> Self {
        Self {
            buckets: BTreeMap::new(),
            max_per_country,
        }
    }

    /// Insert a channel into its country bucket, honoring dedupe and cap
    pub fn insert(&mut self, channel: Channel) -> InsertOutcome {
        let bucket = self
            .buckets
            .entry(channel.country_name().to_string())
            .or_default();

        if bucket.iter().any(|c| c.dedup_key() == channel.dedup_key()) {
            return InsertOutcome::Duplicate;
        }

        if bucket.len() >= self.max_per_country {
            return InsertOutcome::CapReached;
        }

        bucket.push(channel);
        InsertOutcome::Added
    }

    pub fn get(&self, country: &str) -> Option<&[Channel]> {
        self.buckets.get(country).map(|v| v.as_slice())
    }

    /// Iterate non-empty countries in name order
    pub fn countries(&self) -> impl Iterator<Item = (&str, &[Channel])> {
        self.buckets
            .iter()
            .filter(|(_, channels)| !channels.is_empty())
            .map(|(country, channels)| (country.as_str(), channels.as_slice()))
    }

    pub fn country_count(&self) -> usize {
        self.countries().count()
    }

    pub fn channel_count(&self) -> usize {
        self.buckets.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_count() == 0
    }
}
