use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::ParsedChannelInfo;

/// Shortest line still considered a plausible stream URL
const MIN_URL_LEN: usize = 6;

lazy_static! {
    /// `#EXTINF:<duration>` followed by whitespace, a comma or end of line
    static ref EXTINF_REGEX: Regex =
        Regex::new(r"^#EXTINF:\s*-?\d+(?:\.\d+)?(?:[\s,]|$)").unwrap();
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"(\w+(?:-\w+)*)="([^"]*)""#).unwrap();
}

/// Parse one `#EXTINF` directive line
///
/// Format: `#EXTINF:-1 tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Name`
///
/// Returns `None` when the line is not a directive (header, comment, blank).
/// The name is everything after the last comma, trimmed; without a comma it
/// stays empty.
pub fn parse_metadata_line(line: &str) -> Option<ParsedChannelInfo> {
    let line = line.trim();
    let directive = EXTINF_REGEX.find(line)?;
    let content = &line[directive.end()..];

    // A match ending on the comma consumed it; put it back for the name split
    let content = if directive.as_str().ends_with(',') {
        &line[directive.end() - 1..]
    } else {
        content
    };

    let (header, name) = match content.rfind(',') {
        Some(pos) => (&content[..pos], content[pos + 1..].trim()),
        None => (content, ""),
    };

    let mut attributes: HashMap<&str, &str> = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(header) {
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            attributes.entry(key.as_str()).or_insert(value.as_str());
        }
    }

    let attr = |key: &str| {
        attributes
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    Some(ParsedChannelInfo {
        id: attr("tvg-id"),
        display_name: attr("tvg-name"),
        logo_url: attr("tvg-logo"),
        group_title: attr("group-title"),
        name: name.to_string(),
    })
}

/// Scanner state: at most one metadata entry waits for its URL line
#[derive(Debug, Default)]
enum ScanState {
    #[default]
    AwaitingMetadata,
    AwaitingUrl(ParsedChannelInfo),
}

/// Pairs `#EXTINF` lines with the stream URL line that follows them
///
/// A metadata entry is moved out when the next non-comment line arrives, so
/// it can never attach to a second URL.
#[derive(Debug, Default)]
pub struct PlaylistScanner {
    state: ScanState,
}

impl PlaylistScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw line; returns a `(metadata, url)` pair when the line
    /// completes one.
    pub fn feed(&mut self, raw: &str) -> Option<(ParsedChannelInfo, String)> {
        let line = raw.trim();

        if line.is_empty() {
            return None;
        }

        if line.starts_with("#EXTINF") {
            self.state = match parse_metadata_line(line) {
                Some(info) => ScanState::AwaitingUrl(info),
                None => ScanState::AwaitingMetadata,
            };
            return None;
        }

        // #EXTM3U, #EXTVLCOPT, plain comments
        if line.starts_with('#') {
            return None;
        }

        match std::mem::take(&mut self.state) {
            ScanState::AwaitingUrl(info) if line.len() >= MIN_URL_LEN => {
                Some((info, line.to_string()))
            }
            _ => None,
        }
    }

    /// True while a metadata entry is waiting for its URL
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ScanState::AwaitingUrl(_))
    }
}

/// Split a playlist body into its `(metadata, url)` pairs
pub fn scan_playlist(body: &str) -> Vec<(ParsedChannelInfo, String)> {
    let mut scanner = PlaylistScanner::new();
    body.lines().filter_map(|line| scanner.feed(line)).collect()
}
