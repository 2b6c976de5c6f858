//! Ticket Insights Library
//!
//! Ingests a periodically refreshed, "flattened" label/value ticket
//! spreadsheet, normalizes it into typed ticket records and derives
//! performance metrics and customer profitability per reporting period.
//!
//! ## Pipeline
//!
//! ```text
//! RowSource → line_parser → decoder → records → SnapshotStore → metrics + profitability
//! ```
//!
//! The spreadsheet is tolerant input: labels are reworded over time, rows are
//! partial, booleans and dates arrive in several encodings. Each stage is
//! total over that input; only transport and storage failures are errors.
//!
//! ## Architecture Overview
//!
//! - [`period`] - the six reporting periods and their sheet names
//! - [`line_parser`] - RFC4180-style line splitting with quote repair
//! - [`decoder`] - side-by-side label/value pair decoding
//! - [`normalize`] - label normalization and lenient value coercion
//! - [`records`] - alias-table mapping onto [`models::TicketRecord`]
//! - [`metrics`] / [`profitability`] - pure per-period aggregates
//! - [`store`] - persistence contract with in-memory and SQLite backends
//! - [`source`] - spreadsheet API, published CSV and file transports
//! - [`orchestrator`] - refresh runs and the query surface
//! - [`scheduler`] - background refresh with explicit start/stop
//! - [`export`] - fixed-column CSV export
//! - [`config`] / [`logging`] / [`error`] - ambient plumbing
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticket_insights::orchestrator::RefreshOrchestrator;
//! use ticket_insights::period::Period;
//! use ticket_insights::source::FileSource;
//! use ticket_insights::store::MemoryStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = RefreshOrchestrator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(FileSource::new("dashboard.csv")),
//! );
//! orchestrator.refresh(Period::Last30Days).await?;
//! let metrics = orchestrator.metrics(Period::Last30Days).await?;
//! println!("{} tickets, {}% resolved", metrics.total_tickets, metrics.resolution_rate);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod export;
pub mod line_parser;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod period;
pub mod profitability;
pub mod records;
pub mod scheduler;
pub mod source;
pub mod store;

pub use error::{PipelineError, SourceError, StoreError};
pub use orchestrator::{RefreshOrchestrator, RefreshOutcome};
pub use period::Period;
