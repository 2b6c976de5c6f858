//! Error taxonomy for the ingestion pipeline.
//!
//! Row-level failures never surface here; they are collected in
//! [`crate::records::BuildReport`]. Empty upstream responses are not errors
//! either. What remains is transport failure, storage failure and timeouts.

use crate::period::Period;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP_FAILURE: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP_STATUS: {status} from {url}")]
    Status { status: u16, url: String },
    #[error("AUTH_MISSING: {0}")]
    Auth(String),
    #[error("IO_FAILURE: {0}")]
    Io(#[from] std::io::Error),
    #[error("DECODE_FAILURE: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLITE: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("SERIALIZATION: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO_FAILURE: {0}")]
    Io(#[from] std::io::Error),
    #[error("INTERNAL: store mutex poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Both transports failed; persisted data for the period is untouched.
    #[error("ingestion failed for period {period}: primary: {primary}; fallback: {fallback}")]
    Ingestion {
        period: Period,
        primary: SourceError,
        fallback: SourceError,
    },
    /// A single transport failed and no fallback was configured.
    #[error("ingestion failed for period {period}: {source}")]
    Source {
        period: Period,
        #[source]
        source: SourceError,
    },
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("export failed: {0}")]
    Export(#[from] csv::Error),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
pub type StoreResult<T> = Result<T, StoreError>;
