//! Snapshot Store
//!
//! Persistence contract for snapshots, ticket records and the two derived
//! per-period aggregates. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] - process-local, used by tests and one-shot CLI runs
//! - [`SqliteStore`] - durable, one file per installation
//!
//! Implementations must be `Send + Sync`; the orchestrator shares one store
//! across concurrently refreshing periods. Record replacement for a period is
//! atomic: readers never observe a half-replaced set.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewSnapshot, PerformanceMetrics, ProfitabilityAnalysis, Snapshot, TicketFilter, TicketRecord,
};
use crate::period::Period;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub trait SnapshotStore: Send + Sync {
    /// Append an immutable snapshot and return it with its assigned id.
    fn append_snapshot(&self, snapshot: NewSnapshot) -> StoreResult<Snapshot>;

    /// Most recent snapshot by creation time, ties broken by id.
    fn latest_snapshot(&self) -> StoreResult<Option<Snapshot>>;

    /// Up to `limit` snapshots, newest first.
    fn recent_snapshots(&self, limit: usize) -> StoreResult<Vec<Snapshot>>;

    /// Replace every record of `period` with `records`.
    fn replace_records(&self, period: Period, records: &[TicketRecord]) -> StoreResult<()>;

    /// All records of `period` in insertion order.
    fn records(&self, period: Period) -> StoreResult<Vec<TicketRecord>>;

    /// Records of `period` matching `filter`, newest timestamp first.
    fn query_records(&self, period: Period, filter: &TicketFilter) -> StoreResult<Vec<TicketRecord>> {
        let mut records: Vec<_> = self
            .records(period)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(filter.effective_limit());
        Ok(records)
    }

    fn upsert_metrics(&self, metrics: &PerformanceMetrics) -> StoreResult<()>;

    fn metrics(&self, period: Period) -> StoreResult<Option<PerformanceMetrics>>;

    fn upsert_profitability(&self, analysis: &ProfitabilityAnalysis) -> StoreResult<()>;

    fn profitability(&self, period: Period) -> StoreResult<Option<ProfitabilityAnalysis>>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshots: Vec<Snapshot>,
    records: HashMap<Period, Vec<TicketRecord>>,
    metrics: HashMap<Period, PerformanceMetrics>,
    profitability: HashMap<Period, ProfitabilityAnalysis>,
}

/// In-process store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryInner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SnapshotStore for MemoryStore {
    fn append_snapshot(&self, snapshot: NewSnapshot) -> StoreResult<Snapshot> {
        let mut inner = self.lock()?;
        let stored = Snapshot {
            id: inner.snapshots.len() as i64 + 1,
            source: snapshot.source,
            rows: snapshot.rows,
            created_at: snapshot.created_at,
        };
        inner.snapshots.push(stored.clone());
        Ok(stored)
    }

    fn latest_snapshot(&self) -> StoreResult<Option<Snapshot>> {
        let inner = self.lock()?;
        Ok(inner
            .snapshots
            .iter()
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    fn recent_snapshots(&self, limit: usize) -> StoreResult<Vec<Snapshot>> {
        let inner = self.lock()?;
        let mut snapshots = inner.snapshots.clone();
        snapshots.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        snapshots.truncate(limit);
        Ok(snapshots)
    }

    fn replace_records(&self, period: Period, records: &[TicketRecord]) -> StoreResult<()> {
        self.lock()?.records.insert(period, records.to_vec());
        Ok(())
    }

    fn records(&self, period: Period) -> StoreResult<Vec<TicketRecord>> {
        Ok(self.lock()?.records.get(&period).cloned().unwrap_or_default())
    }

    fn upsert_metrics(&self, metrics: &PerformanceMetrics) -> StoreResult<()> {
        self.lock()?.metrics.insert(metrics.period, metrics.clone());
        Ok(())
    }

    fn metrics(&self, period: Period) -> StoreResult<Option<PerformanceMetrics>> {
        Ok(self.lock()?.metrics.get(&period).cloned())
    }

    fn upsert_profitability(&self, analysis: &ProfitabilityAnalysis) -> StoreResult<()> {
        self.lock()?
            .profitability
            .insert(analysis.period, analysis.clone());
        Ok(())
    }

    fn profitability(&self, period: Period) -> StoreResult<Option<ProfitabilityAnalysis>> {
        Ok(self.lock()?.profitability.get(&period).cloned())
    }
}
