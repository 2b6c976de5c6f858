//! Core Data Models
//!
//! This module defines the data structures that flow through the ingestion
//! pipeline, from raw spreadsheet rows to the per-period aggregates.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`RowMatrix`] - cells as fetched from a transport
//! 2. **Decoded**: [`RawRow`] - one row's label/value pairs, keys normalized
//! 3. **Captured**: [`Snapshot`] - every decoded row of one ingestion run
//! 4. **Structured**: [`TicketRecord`] - the canonical ticket, scoped to a period
//! 5. **Derived**: [`PerformanceMetrics`], [`ProfitabilityAnalysis`] - one row per period
//!
//! All public types serialize with camelCase field names so JSON output matches
//! the column names used by the CSV export.

use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Cells as delivered by a transport, before label/value decoding.
pub type RowMatrix = Vec<Vec<String>>;

/// One decoded spreadsheet row: normalized label → raw value, in row order.
///
/// Inserting an existing key keeps its original position and replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    entries: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawRowVisitor;

        impl<'de> Visitor<'de> for RawRowVisitor {
            type Value = RawRow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label keys to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawRow, A::Error> {
                let mut row = RawRow::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    row.insert(k, v);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RawRowVisitor)
    }
}

/// Which transport produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Authenticated spreadsheet values API.
    Primary,
    /// Public CSV download.
    Fallback,
    /// Local file import.
    File,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Primary => "primary",
            SnapshotSource::Fallback => "fallback",
            SnapshotSource::File => "file",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "primary" => SnapshotSource::Primary,
            "file" => SnapshotSource::File,
            _ => SnapshotSource::Fallback,
        }
    }
}

/// Immutable capture of all decoded rows from one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: i64,
    pub source: SnapshotSource,
    pub rows: Vec<RawRow>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot contents before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub source: SnapshotSource,
    pub rows: Vec<RawRow>,
    pub created_at: DateTime<Utc>,
}

/// Canonical structured ticket, scoped to one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub period: Period,
    pub timestamp: DateTime<Utc>,
    pub ticket_id: Option<i32>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub total_tickets: i32,

    pub urgent: bool,
    pub vip: bool,
    pub specialized: bool,
    pub cancelled_before: bool,
    pub needed_integration: bool,
    pub payment_issue: bool,

    pub risk_score: Option<String>,
    pub recurrence_score: Option<String>,
    pub classification: Option<String>,
    pub recommendation: Option<String>,

    pub customer_since: Option<DateTime<Utc>>,
    pub days_as_customer: i32,
    pub status: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

pub const OPEN_STATUSES: [&str; 2] = ["Open", "2"];
pub const HIGH_RISK: &str = "ALTO";
pub const HIGH_RECURRENCE: &str = "ALTA";

impl TicketRecord {
    pub fn is_open(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| OPEN_STATUSES.contains(&s))
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_score.as_deref() == Some(HIGH_RISK)
    }

    pub fn is_high_recurrence(&self) -> bool {
        self.recurrence_score.as_deref() == Some(HIGH_RECURRENCE)
    }

    /// Email used for customer grouping; blank values count as absent.
    pub fn customer_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }
}

/// Period-scoped performance statistics. One row per period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub period: Period,
    pub total_tickets: u32,
    pub open_tickets: u32,
    pub closed_tickets: u32,
    pub urgent_tickets: u32,
    pub vip_tickets: u32,
    pub specialized_tickets: u32,
    pub cancelled_tickets: u32,
    pub resolution_rate: f64,
    pub cancellation_rate: f64,
    pub total_customers: u32,
    pub new_customers: u32,
    pub high_risk_count: u32,
    pub high_recurrence_count: u32,
}

/// Period-scoped profitability classification. One row per period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityAnalysis {
    pub period: Period,
    pub total_clients: u32,
    pub profitable_clients: u32,
    pub unprofitable_clients: u32,
    pub total_tickets: u32,
    pub urgent_tickets: u32,
    pub vip_tickets: u32,
    pub effort_rate: f64,
    pub estimated_cost: f64,
    pub average_score: f64,
}

pub const DEFAULT_TICKET_LIMIT: usize = 100;

/// Predicate set for ticket queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketFilter {
    pub urgent: Option<bool>,
    pub vip: Option<bool>,
    pub specialized: Option<bool>,
    pub cancelled_before: Option<bool>,
    pub classification: Option<String>,
    pub risk_score: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl TicketFilter {
    pub fn matches(&self, record: &TicketRecord) -> bool {
        fn flag(wanted: Option<bool>, actual: bool) -> bool {
            wanted.map_or(true, |w| w == actual)
        }
        fn text(wanted: &Option<String>, actual: &Option<String>) -> bool {
            wanted.as_ref().map_or(true, |w| actual.as_ref() == Some(w))
        }

        flag(self.urgent, record.urgent)
            && flag(self.vip, record.vip)
            && flag(self.specialized, record.specialized)
            && flag(self.cancelled_before, record.cancelled_before)
            && text(&self.classification, &record.classification)
            && text(&self.risk_score, &record.risk_score)
            && text(&self.status, &record.status)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_TICKET_LIMIT)
    }
}
