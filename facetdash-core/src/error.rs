//! Error types surfaced by the engine.
//!
//! Token parsing, counting and rollups never fail; only I/O does.

use thiserror::Error;

/// Failure while talking to the entity backend.
///
/// A malformed body is reported separately for diagnostics, but the fetcher
/// handles it exactly like a transport failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Used by in-process sources that have no URL or HTTP status.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure while reading a local dataset or taxonomy file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
