//! SQLite-backed snapshot store.

use super::SnapshotStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewSnapshot, PerformanceMetrics, ProfitabilityAnalysis, RawRow, Snapshot, SnapshotSource,
    TicketFilter, TicketRecord,
};
use crate::period::Period;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const TICKET_COLUMNS: &str = "period, timestamp, ticket_id, name, email, subject, total_tickets, \
     urgent, vip, specialized, cancelled_before, needed_integration, payment_issue, \
     risk_score, recurrence_score, classification, recommendation, \
     customer_since, days_as_customer, status, deadline";

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        debug!(path = %path.display(), "Opened ticket store");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SnapshotStore for SqliteStore {
    fn append_snapshot(&self, snapshot: NewSnapshot) -> StoreResult<Snapshot> {
        let rows_json = serde_json::to_string(&snapshot.rows)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO snapshots (source, rows_json, created_at) VALUES (?1, ?2, ?3)",
            params![
                snapshot.source.as_str(),
                rows_json,
                format_time(&snapshot.created_at)
            ],
        )?;

        Ok(Snapshot {
            id: conn.last_insert_rowid(),
            source: snapshot.source,
            rows: snapshot.rows,
            created_at: snapshot.created_at,
        })
    }

    fn latest_snapshot(&self) -> StoreResult<Option<Snapshot>> {
        let conn = self.lock()?;
        let snapshot = conn
            .query_row(
                "SELECT id, source, rows_json, created_at FROM snapshots
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                parse_snapshot_row,
            )
            .optional()?;
        Ok(snapshot)
    }

    fn recent_snapshots(&self, limit: usize) -> StoreResult<Vec<Snapshot>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT id, source, rows_json, created_at FROM snapshots
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let snapshots = statement
            .query_map([sql_limit(limit)], parse_snapshot_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    fn replace_records(&self, period: Period, records: &[TicketRecord]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM ticket_records WHERE period = ?1",
            [period.code()],
        )?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO ticket_records ({TICKET_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
            ))?;
            for record in records {
                insert.execute(params![
                    period.code(),
                    format_time(&record.timestamp),
                    record.ticket_id,
                    record.name,
                    record.email,
                    record.subject,
                    record.total_tickets,
                    record.urgent,
                    record.vip,
                    record.specialized,
                    record.cancelled_before,
                    record.needed_integration,
                    record.payment_issue,
                    record.risk_score,
                    record.recurrence_score,
                    record.classification,
                    record.recommendation,
                    record.customer_since.as_ref().map(format_time),
                    record.days_as_customer,
                    record.status,
                    record.deadline.as_ref().map(format_time),
                ])?;
            }
        }
        tx.commit()?;
        debug!(%period, count = records.len(), "Replaced ticket records");
        Ok(())
    }

    fn records(&self, period: Period) -> StoreResult<Vec<TicketRecord>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket_records WHERE period = ?1 ORDER BY id ASC"
        ))?;
        let records = statement
            .query_map([period.code()], parse_ticket_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn query_records(&self, period: Period, filter: &TicketFilter) -> StoreResult<Vec<TicketRecord>> {
        let conn = self.lock()?;
        let mut query = format!("SELECT {TICKET_COLUMNS} FROM ticket_records WHERE period = ?");
        let mut values: Vec<Value> = vec![Value::Text(period.code().to_string())];

        let flags = [
            ("urgent", filter.urgent),
            ("vip", filter.vip),
            ("specialized", filter.specialized),
            ("cancelled_before", filter.cancelled_before),
        ];
        for (column, wanted) in flags {
            if let Some(wanted) = wanted {
                query.push_str(&format!(" AND {column} = ?"));
                values.push(Value::Integer(i64::from(wanted)));
            }
        }

        let texts = [
            ("classification", &filter.classification),
            ("risk_score", &filter.risk_score),
            ("status", &filter.status),
        ];
        for (column, wanted) in texts {
            if let Some(wanted) = wanted {
                query.push_str(&format!(" AND {column} = ?"));
                values.push(Value::Text(wanted.clone()));
            }
        }

        query.push_str(" ORDER BY timestamp DESC, id ASC LIMIT ?");
        values.push(Value::Integer(sql_limit(filter.effective_limit())));

        let mut statement = conn.prepare(&query)?;
        let records = statement
            .query_map(params_from_iter(values.iter()), parse_ticket_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn upsert_metrics(&self, m: &PerformanceMetrics) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO performance_metrics (
               period, total_tickets, open_tickets, closed_tickets, urgent_tickets, vip_tickets,
               specialized_tickets, cancelled_tickets, resolution_rate, cancellation_rate,
               total_customers, new_customers, high_risk_count, high_recurrence_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(period) DO UPDATE SET
               total_tickets = excluded.total_tickets,
               open_tickets = excluded.open_tickets,
               closed_tickets = excluded.closed_tickets,
               urgent_tickets = excluded.urgent_tickets,
               vip_tickets = excluded.vip_tickets,
               specialized_tickets = excluded.specialized_tickets,
               cancelled_tickets = excluded.cancelled_tickets,
               resolution_rate = excluded.resolution_rate,
               cancellation_rate = excluded.cancellation_rate,
               total_customers = excluded.total_customers,
               new_customers = excluded.new_customers,
               high_risk_count = excluded.high_risk_count,
               high_recurrence_count = excluded.high_recurrence_count",
            params![
                m.period.code(),
                m.total_tickets,
                m.open_tickets,
                m.closed_tickets,
                m.urgent_tickets,
                m.vip_tickets,
                m.specialized_tickets,
                m.cancelled_tickets,
                m.resolution_rate,
                m.cancellation_rate,
                m.total_customers,
                m.new_customers,
                m.high_risk_count,
                m.high_recurrence_count,
            ],
        )?;
        Ok(())
    }

    fn metrics(&self, period: Period) -> StoreResult<Option<PerformanceMetrics>> {
        let conn = self.lock()?;
        let metrics = conn
            .query_row(
                "SELECT period, total_tickets, open_tickets, closed_tickets, urgent_tickets,
                        vip_tickets, specialized_tickets, cancelled_tickets, resolution_rate,
                        cancellation_rate, total_customers, new_customers, high_risk_count,
                        high_recurrence_count
                 FROM performance_metrics WHERE period = ?1",
                [period.code()],
                |row| {
                    Ok(PerformanceMetrics {
                        period: parse_period(&row.get::<_, String>(0)?)?,
                        total_tickets: row.get(1)?,
                        open_tickets: row.get(2)?,
                        closed_tickets: row.get(3)?,
                        urgent_tickets: row.get(4)?,
                        vip_tickets: row.get(5)?,
                        specialized_tickets: row.get(6)?,
                        cancelled_tickets: row.get(7)?,
                        resolution_rate: row.get(8)?,
                        cancellation_rate: row.get(9)?,
                        total_customers: row.get(10)?,
                        new_customers: row.get(11)?,
                        high_risk_count: row.get(12)?,
                        high_recurrence_count: row.get(13)?,
                    })
                },
            )
            .optional()?;
        Ok(metrics)
    }

    fn upsert_profitability(&self, a: &ProfitabilityAnalysis) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO profitability_analysis (
               period, total_clients, profitable_clients, unprofitable_clients, total_tickets,
               urgent_tickets, vip_tickets, effort_rate, estimated_cost, average_score
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(period) DO UPDATE SET
               total_clients = excluded.total_clients,
               profitable_clients = excluded.profitable_clients,
               unprofitable_clients = excluded.unprofitable_clients,
               total_tickets = excluded.total_tickets,
               urgent_tickets = excluded.urgent_tickets,
               vip_tickets = excluded.vip_tickets,
               effort_rate = excluded.effort_rate,
               estimated_cost = excluded.estimated_cost,
               average_score = excluded.average_score",
            params![
                a.period.code(),
                a.total_clients,
                a.profitable_clients,
                a.unprofitable_clients,
                a.total_tickets,
                a.urgent_tickets,
                a.vip_tickets,
                a.effort_rate,
                a.estimated_cost,
                a.average_score,
            ],
        )?;
        Ok(())
    }

    fn profitability(&self, period: Period) -> StoreResult<Option<ProfitabilityAnalysis>> {
        let conn = self.lock()?;
        let analysis = conn
            .query_row(
                "SELECT period, total_clients, profitable_clients, unprofitable_clients,
                        total_tickets, urgent_tickets, vip_tickets, effort_rate, estimated_cost,
                        average_score
                 FROM profitability_analysis WHERE period = ?1",
                [period.code()],
                |row| {
                    Ok(ProfitabilityAnalysis {
                        period: parse_period(&row.get::<_, String>(0)?)?,
                        total_clients: row.get(1)?,
                        profitable_clients: row.get(2)?,
                        unprofitable_clients: row.get(3)?,
                        total_tickets: row.get(4)?,
                        urgent_tickets: row.get(5)?,
                        vip_tickets: row.get(6)?,
                        effort_rate: row.get(7)?,
                        estimated_cost: row.get(8)?,
                        average_score: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(analysis)
    }
}

fn parse_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    let source: String = row.get(1)?;
    let rows_json: String = row.get(2)?;
    let rows: Vec<RawRow> =
        serde_json::from_str(&rows_json).map_err(|error| conversion_error(2, error.to_string()))?;

    Ok(Snapshot {
        id: row.get(0)?,
        source: SnapshotSource::from_str_lossy(&source),
        rows,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_ticket_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketRecord> {
    Ok(TicketRecord {
        period: parse_period(&row.get::<_, String>(0)?)?,
        timestamp: parse_time(&row.get::<_, String>(1)?)?,
        ticket_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        subject: row.get(5)?,
        total_tickets: row.get(6)?,
        urgent: row.get(7)?,
        vip: row.get(8)?,
        specialized: row.get(9)?,
        cancelled_before: row.get(10)?,
        needed_integration: row.get(11)?,
        payment_issue: row.get(12)?,
        risk_score: row.get(13)?,
        recurrence_score: row.get(14)?,
        classification: row.get(15)?,
        recommendation: row.get(16)?,
        customer_since: parse_optional_time(row.get(17)?)?,
        days_as_customer: row.get(18)?,
        status: row.get(19)?,
        deadline: parse_optional_time(row.get(20)?)?,
    })
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(0, error.to_string()))
}

fn parse_optional_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

fn parse_period(raw: &str) -> rusqlite::Result<Period> {
    raw.parse()
        .map_err(|error: crate::period::UnknownPeriod| conversion_error(0, error.to_string()))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_format_is_fixed_width_and_lossless() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let text = format_time(&t);
        assert_eq!(text, "2024-01-02T03:04:05.000000000Z");
        assert_eq!(parse_time(&text).unwrap(), t);
    }

    #[test]
    fn test_unknown_period_is_conversion_error() {
        assert!(matches!(
            parse_period("99x"),
            Err(rusqlite::Error::FromSqlConversionFailure(..))
        ));
    }

    #[test]
    fn test_empty_store_reads() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.latest_snapshot().unwrap().is_none());
        assert!(store.metrics(Period::Last30Days).unwrap().is_none());
        assert!(store.profitability(Period::Last30Days).unwrap().is_none());
        assert!(store.records(Period::Last30Days).unwrap().is_empty());
        assert!(store.path().is_none());
    }
}
