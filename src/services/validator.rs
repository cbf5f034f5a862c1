//! Stream reachability probing
//!
//! A URL is probed with a header-only request first. Some origins reject
//! HEAD (405/501) while serving content normally, so any HEAD failure falls
//! through to a GET whose body is never read.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Per-tier request timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Redirect hops followed before a tier gives up
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Network strategy used by one probe attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTier {
    Head,
    Get,
}

const PROBE_TIERS: [ProbeTier; 2] = [ProbeTier::Head, ProbeTier::Get];

impl fmt::Display for ProbeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTier::Head => write!(f, "HEAD"),
            ProbeTier::Get => write!(f, "GET"),
        }
    }
}

/// Result of probing a stream URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Status in [200, 400)
    Reachable(u16),
    /// Server answered with a status outside the success range
    Unreachable(u16),
    /// No usable answer (timeout, connection error, redirect loop, bad URL)
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable(_))
    }

    fn from_status(status: StatusCode) -> Self {
        let code = status.as_u16();
        if (200..400).contains(&code) {
            ProbeOutcome::Reachable(code)
        } else {
            ProbeOutcome::Unreachable(code)
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Reachable(code) => write!(f, "reachable (HTTP {})", code),
            ProbeOutcome::Unreachable(code) => write!(f, "unreachable (HTTP {})", code),
            ProbeOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Two-tier reachability checker for stream URLs
#[derive(Clone)]
pub struct StreamValidator {
    client: Client,
}

impl StreamValidator {
    pub fn new(user_agent: &str, timeout: Duration, max_redirects: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()
            .context("Failed to create probe HTTP client")?;

        Ok(Self { client })
    }

    /// True when either tier answers with a 2xx/3xx status. Never fails.
    pub async fn is_reachable(&self, url: &str) -> bool {
        self.probe(url).await.is_reachable()
    }

    /// Run the tiers in order, stopping at the first reachable answer.
    /// Returns the outcome of the last tier tried.
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        if let Err(reason) = check_probeable(url) {
            return ProbeOutcome::Failed(reason);
        }

        let mut outcome = ProbeOutcome::Failed("no probe attempted".to_string());
        for tier in PROBE_TIERS {
            outcome = self.probe_tier(tier, url).await;
            if outcome.is_reachable() {
                break;
            }
            debug!(%tier, url, %outcome, "probe tier failed");
        }

        outcome
    }

    async fn probe_tier(&self, tier: ProbeTier, url: &str) -> ProbeOutcome {
        let request = match tier {
            ProbeTier::Head => self.client.head(url),
            ProbeTier::Get => self.client.get(url),
        };

        // The response is dropped after the headers; GET bodies are never read
        match request.send().await {
            Ok(response) => ProbeOutcome::from_status(response.status()),
            Err(e) if e.is_timeout() => ProbeOutcome::Failed(format!("{} timed out", tier)),
            Err(e) if e.is_redirect() => ProbeOutcome::Failed("too many redirects".to_string()),
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        }
    }
}

/// Only absolute http(s) URLs are worth a network round trip
fn check_probeable(url: &str) -> std::result::Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme: {}", other)),
    }
}
