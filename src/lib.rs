//! IPTV channel catalog curator
//!
//! Fetches remote M3U playlists, probes every stream URL, sorts reachable
//! channels by country and merges them into a persisted catalog document.

pub mod config;
pub mod models;
pub mod services;
