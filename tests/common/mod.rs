#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_insights::error::SourceError;
use ticket_insights::line_parser::parse_lines;
use ticket_insights::models::{RowMatrix, SnapshotSource};
use ticket_insights::period::Period;
use ticket_insights::source::RowSource;

/// Dashboard export in the sheet's side-by-side label/value layout.
///
/// Decodes to five rows: four tickets and one row with no usable signal.
pub const SAMPLE_DASHBOARD: &str = "\
🚨 ALERTAS:,Atenção
ID:,101,Nome:,Ana Souza,Email:,ana@example.com,Status:,Open,Flag Urgente:,SIM ⚠️,Score Risco:,ALTO,Classificação:,Crítico,Dias Cliente:,10,Timestamp:,2024-05-01T10:00:00Z
ID:,102,Nome:,Bruno Lima,Email:,bruno@example.com,Status:,Closed,Flag VIP:,SIM,Score Recorrência:,ALTA,Dias Cliente:,400,Timestamp:,2024-05-02T10:00:00Z
ID:,103,Nome:,\"Carla, Ltda\",Email:,carla@example.com,Status:,2,Já Cancelou Antes:,Sim,Dias Cliente:,45,Timestamp:,2024-05-03T10:00:00Z
ID:,104,Nome:,Ana Souza,Email:,ana@example.com,Status:,Resolved,Flag Especializado:,true,Dias Cliente:,20,Timestamp:,2024-05-04T10:00:00Z

Nome:,Sem Sinal,Status:,Open
📊 RESUMO,x
";

pub const SAMPLE_RAW_ROWS: usize = 5;
pub const SAMPLE_RECORDS: usize = 4;

pub fn sample_matrix() -> RowMatrix {
    parse_lines(SAMPLE_DASHBOARD).collect()
}

pub fn write_sample(dir: &Path, filename: &str) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, SAMPLE_DASHBOARD).unwrap();
    path
}

/// Source returning a settable matrix and recording every requested period.
pub struct StaticSource {
    matrix: Mutex<RowMatrix>,
    kind: SnapshotSource,
    pub requested: Mutex<Vec<Period>>,
}

impl StaticSource {
    pub fn new(matrix: RowMatrix) -> Arc<Self> {
        Self::with_kind(matrix, SnapshotSource::Primary)
    }

    pub fn with_kind(matrix: RowMatrix, kind: SnapshotSource) -> Arc<Self> {
        Arc::new(Self {
            matrix: Mutex::new(matrix),
            kind,
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn requested(&self) -> Vec<Period> {
        self.requested.lock().unwrap().clone()
    }

    /// Swap what the upstream serves from now on.
    pub fn set_matrix(&self, matrix: RowMatrix) {
        *self.matrix.lock().unwrap() = matrix;
    }
}

#[async_trait]
impl RowSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn kind(&self) -> SnapshotSource {
        self.kind
    }

    async fn fetch(&self, period: Period) -> Result<RowMatrix, SourceError> {
        self.requested.lock().unwrap().push(period);
        Ok(self.matrix.lock().unwrap().clone())
    }
}

/// Source that always fails and counts its calls.
#[derive(Default)]
pub struct FailingSource {
    pub calls: AtomicUsize,
}

impl FailingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Primary
    }

    async fn fetch(&self, _period: Period) -> Result<RowMatrix, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Status {
            status: 503,
            url: "http://upstream.invalid".to_string(),
        })
    }
}

/// Source that holds each fetch open for `delay` and tracks the highest
/// number of fetches in flight at once.
pub struct SlowSource {
    matrix: RowMatrix,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl SlowSource {
    pub fn new(matrix: RowMatrix, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            matrix,
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Primary
    }

    async fn fetch(&self, _period: Period) -> Result<RowMatrix, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.matrix.clone())
    }
}
