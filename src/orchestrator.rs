//! Refresh Orchestrator
//!
//! Drives one ingestion run per call:
//!
//! ```text
//! fetch (primary → fallback) → decode → snapshot → records → metrics + profitability
//! ```
//!
//! Runs for the same period are serialized by a per-period async lock;
//! different periods proceed concurrently and share the store. A failed run
//! leaves everything persisted for the period exactly as it was.
//!
//! The orchestrator also owns the read-side query surface, since metric reads
//! fall back to a refresh when nothing has been ingested yet.

use crate::decoder::decode_rows;
use crate::error::{PipelineError, PipelineResult};
use crate::export::records_to_csv;
use crate::logging::refresh_span;
use crate::metrics::compute_metrics;
use crate::models::{
    NewSnapshot, PerformanceMetrics, ProfitabilityAnalysis, RawRow, RowMatrix, Snapshot,
    SnapshotSource, TicketFilter, TicketRecord,
};
use crate::period::Period;
use crate::profitability::{analyze_profitability, DEFAULT_UNIT_COST};
use crate::records::{build_records, RowError};
use crate::source::RowSource;
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};

/// Length of the import history shown by default.
pub const RECENT_SNAPSHOT_LIMIT: usize = 10;

/// Phase of the current run for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    #[default]
    Idle,
    Fetching,
    Parsing,
    Persisting,
    Recomputing,
}

/// What one refresh run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub period: Period,
    pub source: SnapshotSource,
    /// `None` when the upstream returned no decodable rows.
    pub snapshot_id: Option<i64>,
    pub raw_rows: usize,
    pub records: usize,
    pub discarded: usize,
    pub row_errors: Vec<RowError>,
    pub finished_at: DateTime<Utc>,
}

impl RefreshOutcome {
    fn empty(period: Period, source: SnapshotSource) -> Self {
        Self {
            period,
            source,
            snapshot_id: None,
            raw_rows: 0,
            records: 0,
            discarded: 0,
            row_errors: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// True when the run left the store untouched.
    pub fn is_empty(&self) -> bool {
        self.snapshot_id.is_none()
    }
}

pub struct RefreshOrchestrator {
    store: Arc<dyn SnapshotStore>,
    primary: Arc<dyn RowSource>,
    fallback: Option<Arc<dyn RowSource>>,
    unit_cost: f64,
    request_timeout: Duration,
    locks: DashMap<Period, Arc<Mutex<()>>>,
    states: DashMap<Period, RefreshState>,
    outcomes: DashMap<Period, RefreshOutcome>,
}

/// Resets a period to idle even when its run is cancelled by a timeout.
struct IdleOnDrop<'a> {
    orchestrator: &'a RefreshOrchestrator,
    period: Period,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.orchestrator.set_state(self.period, RefreshState::Idle);
    }
}

impl RefreshOrchestrator {
    pub fn new(store: Arc<dyn SnapshotStore>, primary: Arc<dyn RowSource>) -> Self {
        Self {
            store,
            primary,
            fallback: None,
            unit_cost: DEFAULT_UNIT_COST,
            request_timeout: Duration::from_secs(60),
            locks: DashMap::new(),
            states: DashMap::new(),
            outcomes: DashMap::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn RowSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: f64) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn state(&self, period: Period) -> RefreshState {
        self.states.get(&period).map(|s| *s).unwrap_or_default()
    }

    /// Outcome of the last successful run for `period` in this process.
    pub fn last_outcome(&self, period: Period) -> Option<RefreshOutcome> {
        self.outcomes.get(&period).map(|o| o.clone())
    }

    /// Run one full ingestion for `period`.
    pub async fn refresh(&self, period: Period) -> PipelineResult<RefreshOutcome> {
        self.refresh_locked(period).instrument(refresh_span(period)).await
    }

    /// Refresh every period concurrently, returning per-period results in
    /// [`Period::ALL`] order. Each run is bounded by the request timeout.
    pub async fn refresh_all(&self) -> Vec<(Period, PipelineResult<RefreshOutcome>)> {
        let runs = Period::ALL
            .map(|period| async move { (period, self.with_timeout(self.refresh(period)).await) });
        join_all(runs).await
    }

    async fn refresh_locked(&self, period: Period) -> PipelineResult<RefreshOutcome> {
        let lock = self.period_lock(period);
        let _guard = lock.lock().await;

        let idle = IdleOnDrop {
            orchestrator: self,
            period,
        };
        let result = self.run(period).await;
        drop(idle);

        match &result {
            Ok(outcome) => {
                info!(
                    source = outcome.source.as_str(),
                    raw_rows = outcome.raw_rows,
                    records = outcome.records,
                    discarded = outcome.discarded,
                    row_errors = outcome.row_errors.len(),
                    "Refresh finished"
                );
                self.outcomes.insert(period, outcome.clone());
            }
            Err(e) => error!(error = %e, "Refresh failed"),
        }
        result
    }

    async fn run(&self, period: Period) -> PipelineResult<RefreshOutcome> {
        self.set_state(period, RefreshState::Fetching);
        let (source, matrix) = self.fetch(period).await?;

        self.set_state(period, RefreshState::Parsing);
        let rows = decode_rows(&matrix);
        if rows.is_empty() {
            warn!(
                source = source.as_str(),
                matrix_rows = matrix.len(),
                "No label/value pairs decoded, leaving stored data untouched"
            );
            return Ok(RefreshOutcome::empty(period, source));
        }

        let ingested_at = Utc::now();
        let report = build_records(&rows, period, ingested_at);
        let raw_rows = rows.len();

        self.set_state(period, RefreshState::Persisting);
        let snapshot = self.store.append_snapshot(NewSnapshot {
            source,
            rows,
            created_at: ingested_at,
        })?;
        self.store.replace_records(period, &report.records)?;

        self.set_state(period, RefreshState::Recomputing);
        self.recompute(period, &report.records)?;

        Ok(RefreshOutcome {
            period,
            source,
            snapshot_id: Some(snapshot.id),
            raw_rows,
            records: report.records.len(),
            discarded: report.discarded,
            row_errors: report.errors,
            finished_at: Utc::now(),
        })
    }

    async fn fetch(&self, period: Period) -> PipelineResult<(SnapshotSource, RowMatrix)> {
        let primary_err = match self.primary.fetch(period).await {
            Ok(matrix) => return Ok((self.primary.kind(), matrix)),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(PipelineError::Source {
                period,
                source: primary_err,
            });
        };

        warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_err,
            "Primary transport failed, trying fallback"
        );

        match fallback.fetch(period).await {
            Ok(matrix) => Ok((fallback.kind(), matrix)),
            Err(fallback_err) => Err(PipelineError::Ingestion {
                period,
                primary: primary_err,
                fallback: fallback_err,
            }),
        }
    }

    fn recompute(
        &self,
        period: Period,
        records: &[TicketRecord],
    ) -> PipelineResult<(PerformanceMetrics, ProfitabilityAnalysis)> {
        let metrics = compute_metrics(period, records);
        self.store.upsert_metrics(&metrics)?;

        let analysis = analyze_profitability(period, records, self.unit_cost);
        self.store.upsert_profitability(&analysis)?;

        debug!(%period, records = records.len(), "Recomputed derived aggregates");
        Ok((metrics, analysis))
    }

    fn period_lock(&self, period: Period) -> Arc<Mutex<()>> {
        self.locks.entry(period).or_default().clone()
    }

    fn set_state(&self, period: Period, state: RefreshState) {
        self.states.insert(period, state);
    }

    /// Stored records for `period`, refreshing first when there are none.
    async fn records_or_refresh(&self, period: Period) -> PipelineResult<Vec<TicketRecord>> {
        let records = self.store.records(period)?;
        if !records.is_empty() {
            return Ok(records);
        }
        debug!(%period, "No stored records, refreshing before read");
        self.refresh(period).await?;
        Ok(self.store.records(period)?)
    }

    pub async fn metrics(&self, period: Period) -> PipelineResult<PerformanceMetrics> {
        if let Some(metrics) = self.store.metrics(period)? {
            return Ok(metrics);
        }
        let records = self.records_or_refresh(period).await?;
        let metrics = compute_metrics(period, &records);
        // Zeroed aggregates are not cached, so the next read fetches again.
        if !records.is_empty() {
            self.store.upsert_metrics(&metrics)?;
        }
        Ok(metrics)
    }

    pub async fn profitability(&self, period: Period) -> PipelineResult<ProfitabilityAnalysis> {
        if let Some(analysis) = self.store.profitability(period)? {
            return Ok(analysis);
        }
        let records = self.records_or_refresh(period).await?;
        let analysis = analyze_profitability(period, &records, self.unit_cost);
        if !records.is_empty() {
            self.store.upsert_profitability(&analysis)?;
        }
        Ok(analysis)
    }

    pub fn tickets(&self, period: Period, filter: &TicketFilter) -> PipelineResult<Vec<TicketRecord>> {
        Ok(self.store.query_records(period, filter)?)
    }

    pub fn export_csv(&self, period: Period) -> PipelineResult<String> {
        let records = self.store.records(period)?;
        Ok(records_to_csv(&records)?)
    }

    pub fn latest_snapshot(&self) -> PipelineResult<Option<Snapshot>> {
        Ok(self.store.latest_snapshot()?)
    }

    pub fn recent_snapshots(&self, limit: usize) -> PipelineResult<Vec<Snapshot>> {
        Ok(self.store.recent_snapshots(limit)?)
    }

    /// Refresh `period`, then return the rows of the newest snapshot.
    pub async fn raw_rows(&self, period: Period) -> PipelineResult<Vec<RawRow>> {
        self.refresh(period).await?;
        Ok(self
            .store
            .latest_snapshot()?
            .map(|s| s.rows)
            .unwrap_or_default())
    }

    /// Bound `fut` by the configured request timeout.
    pub async fn with_timeout<T, F>(&self, fut: F) -> PipelineResult<T>
    where
        F: Future<Output = PipelineResult<T>>,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| PipelineError::Timeout(self.request_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct Fixed(RowMatrix);

    #[async_trait]
    impl RowSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn kind(&self) -> SnapshotSource {
            SnapshotSource::File
        }
        async fn fetch(&self, _period: Period) -> Result<RowMatrix, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn cells(rows: &[&[&str]]) -> RowMatrix {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_state_returns_to_idle() {
        let source = Arc::new(Fixed(cells(&[&["ID:", "1", "Status:", "Open"]])));
        let orch = RefreshOrchestrator::new(Arc::new(MemoryStore::new()), source);
        assert_eq!(orch.state(Period::Last7Days), RefreshState::Idle);

        let outcome = orch.refresh(Period::Last7Days).await.unwrap();
        assert_eq!(outcome.records, 1);
        assert_eq!(orch.state(Period::Last7Days), RefreshState::Idle);
        assert_eq!(orch.last_outcome(Period::Last7Days), Some(outcome));
    }

    #[tokio::test]
    async fn test_empty_upstream_leaves_store_untouched() {
        let source = Arc::new(Fixed(cells(&[&["📊 RESUMO", "x"], &["", ""]])));
        let store = Arc::new(MemoryStore::new());
        let orch = RefreshOrchestrator::new(store.clone(), source);

        let outcome = orch.refresh(Period::Last30Days).await.unwrap();
        assert!(outcome.is_empty());
        assert!(store.latest_snapshot().unwrap().is_none());
        assert!(store.metrics(Period::Last30Days).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let source = Arc::new(Fixed(Vec::new()));
        let orch = RefreshOrchestrator::new(Arc::new(MemoryStore::new()), source)
            .with_request_timeout(Duration::from_millis(10));

        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let err = orch.with_timeout(slow).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }
}
