//! Error taxonomy: malformed input is per-request fatal, missing downstream
//! data is absorbed into degraded results, misconfiguration fails at startup.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A raw signal value could not be parsed. The request cannot be scored.
    #[error("malformed signal '{signal}': {detail}")]
    Validation { signal: String, detail: String },

    /// An enrichment source or alert store could not be reached. The
    /// built-in JSON/SQLite backends never hit this (misses come back as
    /// `None`, SQLite trouble as `Storage`); it is the variant for
    /// `EnrichmentLookup`/`AlertStore` implementations backed by remote
    /// services. Callers recover locally (missing signal / empty window).
    #[error("lookup unavailable: {0}")]
    LookupUnavailable(String),

    /// Invalid threshold/weight configuration. Fatal at startup.
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Audit payload could not be sealed or opened.
    #[error("crypto: {0}")]
    Crypto(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(signal: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Validation {
            signal: signal.into(),
            detail: detail.into(),
        }
    }
}
