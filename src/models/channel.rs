use serde::Serialize;

/// Category used when a playlist entry carries no group-title
pub const DEFAULT_CATEGORY: &str = "General";

/// A playlist the coordinator pulls channels from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub label: String,
    pub url: String,
}

impl Source {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Normalized output of parsing one `#EXTINF` line
///
/// `name` is never absent: an entry without a trailing name keeps an
/// empty string and is treated as an unknown channel downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedChannelInfo {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub group_title: Option<String>,
    pub name: String,
}

/// Catalog entry for a stream that answered the reachability probe
///
/// Fields are read-only; a changed upstream entry produces a fresh
/// `Channel` from a fresh parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    name: String,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo: Option<String>,
    category: String,
    country_name: String,
}

impl Channel {
    /// Build a channel from a parsed entry and its validated stream URL.
    /// Returns `None` for an empty URL.
    pub fn from_parsed(info: ParsedChannelInfo, url: &str, country_name: String) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        Some(Self {
            name: info.name,
            url: url.to_string(),
            logo: info.logo_url,
            category: info
                .group_title
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            country_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn logo(&self) -> Option<&str> {
        self.logo.as_deref()
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn country_name(&self) -> &str {
        &self.country_name
    }

    /// Key used to suppress duplicates inside a country bucket
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.name, &self.url)
    }
}
