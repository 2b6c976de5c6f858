//! Ticket Record Builder
//!
//! Maps decoded rows onto the fixed [`TicketRecord`] schema. The spreadsheet's
//! labels have been reworded several times without migrating old exports, so
//! every schema field is resolved through an ordered alias list
//! ([`FIELD_ALIASES`]); the first alias present in the row wins.
//!
//! Rows carrying no usable signal (no id, no ticket total, no flag set, no
//! classification) are discarded. A row whose values cannot be stored is
//! skipped with a warning; the rest of the batch is unaffected.

use crate::models::{RawRow, TicketRecord};
use crate::normalize::{coerce_bool, coerce_date, coerce_int};
use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Schema fields that are resolved from spreadsheet labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Timestamp,
    TicketId,
    Name,
    Email,
    Subject,
    TotalTickets,
    Urgent,
    Vip,
    Specialized,
    CancelledBefore,
    NeededIntegration,
    PaymentIssue,
    RiskScore,
    RecurrenceScore,
    Classification,
    Recommendation,
    CustomerSince,
    DaysAsCustomer,
    Status,
    Deadline,
}

/// Ordered label aliases per field, most current wording first.
pub const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::Timestamp, &["timestamp", "criado_em", "criadoem"]),
    (Field::TicketId, &["id", "ticket_id", "ticketid"]),
    (Field::Name, &["nome", "cliente"]),
    (Field::Email, &["email"]),
    (Field::Subject, &["assunto", "tipo"]),
    (
        Field::TotalTickets,
        &["total_tickets", "totaltickets", "total_de_tickets", "total"],
    ),
    (Field::Urgent, &["flag_urgente", "urgente", "flagurgente"]),
    (Field::Vip, &["flag_vip", "vip", "flagvip"]),
    (
        Field::Specialized,
        &["flag_especializado", "especializado", "flagespecializado"],
    ),
    (
        Field::CancelledBefore,
        &["ja_cancelou_antes", "cancelou", "jacancelouantes"],
    ),
    (
        Field::NeededIntegration,
        &["precisou_integracao", "integracao", "precisouintegracao"],
    ),
    (
        Field::PaymentIssue,
        &["problema_pagamento", "problemapagamento", "pagamento"],
    ),
    (Field::RiskScore, &["score_risco", "scorerisco", "risco"]),
    (
        Field::RecurrenceScore,
        &["score_recorrencia", "scorerecorrencia", "recorrencia"],
    ),
    (Field::Classification, &["classificacao"]),
    (
        Field::Recommendation,
        &["recomendacao", "acao_sugerida", "acaosugerida"],
    ),
    (Field::CustomerSince, &["cliente_desde", "clientedesde"]),
    (
        Field::DaysAsCustomer,
        &["dias_cliente", "diascliente", "dias_como_cliente", "tempo_como_cliente"],
    ),
    (Field::Status, &["status", "status_do_ticket"]),
    (
        Field::Deadline,
        &["prazo", "prazo_final", "prazofinal", "prazo_fr"],
    ),
];

pub fn aliases(field: Field) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Resolve a field's raw value through its alias list.
pub fn resolve<'r>(row: &'r RawRow, field: Field) -> Option<&'r str> {
    aliases(field).iter().find_map(|alias| row.get(alias))
}

/// A row that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
pub enum RowError {
    #[error("row {row}: {field:?} value {value} does not fit a 32-bit integer")]
    OutOfRange { row: usize, field: Field, value: i64 },
}

/// Outcome of building one batch.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub records: Vec<TicketRecord>,
    pub discarded: usize,
    pub errors: Vec<RowError>,
}

/// Build records for `period` from decoded rows.
///
/// `ingested_at` stands in for rows that carry no timestamp of their own.
pub fn build_records(rows: &[RawRow], period: Period, ingested_at: DateTime<Utc>) -> BuildReport {
    let mut report = BuildReport::default();

    for (index, row) in rows.iter().enumerate() {
        debug!(row = index, fields = ?row.keys().collect::<Vec<_>>(), "Processing row");

        match build_record(row, index, period, ingested_at) {
            Ok(Some(record)) => report.records.push(record),
            Ok(None) => report.discarded += 1,
            Err(e) => {
                warn!(error = %e, "Skipping row that could not be converted");
                report.errors.push(e);
            }
        }
    }

    info!(
        %period,
        kept = report.records.len(),
        discarded = report.discarded,
        errors = report.errors.len(),
        "Built ticket records"
    );
    report
}

/// Build one record. `Ok(None)` means the row carried no usable signal.
pub fn build_record(
    row: &RawRow,
    index: usize,
    period: Period,
    ingested_at: DateTime<Utc>,
) -> Result<Option<TicketRecord>, RowError> {
    let text = |field| resolve(row, field).map(str::to_string);
    let flag = |field| coerce_bool(resolve(row, field));
    let date = |field| coerce_date(resolve(row, field));
    let int = |field| {
        let value = coerce_int(resolve(row, field));
        i32::try_from(value).map_err(|_| RowError::OutOfRange {
            row: index,
            field,
            value,
        })
    };

    let ticket_id = int(Field::TicketId)?;
    let total_tickets = int(Field::TotalTickets)?;
    let days_as_customer = int(Field::DaysAsCustomer)?;

    let record = TicketRecord {
        period,
        timestamp: date(Field::Timestamp).unwrap_or(ingested_at),
        ticket_id: (ticket_id != 0).then_some(ticket_id),
        name: text(Field::Name),
        email: text(Field::Email),
        subject: text(Field::Subject),
        total_tickets,
        urgent: flag(Field::Urgent),
        vip: flag(Field::Vip),
        specialized: flag(Field::Specialized),
        cancelled_before: flag(Field::CancelledBefore),
        needed_integration: flag(Field::NeededIntegration),
        payment_issue: flag(Field::PaymentIssue),
        risk_score: text(Field::RiskScore),
        recurrence_score: text(Field::RecurrenceScore),
        classification: text(Field::Classification),
        recommendation: text(Field::Recommendation),
        customer_since: date(Field::CustomerSince),
        days_as_customer,
        status: text(Field::Status),
        deadline: date(Field::Deadline),
    };

    if carries_no_signal(&record) {
        return Ok(None);
    }
    Ok(Some(record))
}

fn carries_no_signal(record: &TicketRecord) -> bool {
    let any_flag = record.urgent
        || record.vip
        || record.specialized
        || record.cancelled_before
        || record.needed_integration
        || record.payment_issue;

    record.ticket_id.is_none()
        && record.total_tickets == 0
        && !any_flag
        && record.classification.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_signal_less_row_dropped() {
        let r = row(&[("nome", "Ana"), ("flag_urgente", "NAO"), ("status", "Open")]);
        assert_eq!(build_record(&r, 0, Period::Last7Days, now()), Ok(None));
    }

    #[test]
    fn test_classification_only_row_kept() {
        let r = row(&[("classificacao", "VIP")]);
        let record = build_record(&r, 0, Period::Last7Days, now()).unwrap().unwrap();
        assert_eq!(record.classification.as_deref(), Some("VIP"));
        assert_eq!(record.timestamp, now());
        assert_eq!(record.period, Period::Last7Days);
    }

    #[test]
    fn test_first_alias_wins() {
        let r = row(&[("total", "9"), ("total_tickets", "3")]);
        let record = build_record(&r, 0, Period::Last30Days, now()).unwrap().unwrap();
        assert_eq!(record.total_tickets, 3);
    }

    #[test]
    fn test_out_of_range_row_skipped_batch_continues() {
        let rows = vec![
            row(&[("id", "99999999999")]),
            row(&[("id", "7"), ("flag_vip", "SIM")]),
            row(&[("nome", "nobody")]),
        ];
        let report = build_records(&rows, Period::Last30Days, now());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].ticket_id, Some(7));
        assert_eq!(report.discarded, 1);
        assert_eq!(
            report.errors,
            vec![RowError::OutOfRange {
                row: 0,
                field: Field::TicketId,
                value: 99_999_999_999
            }]
        );
    }

    #[test]
    fn test_every_field_has_aliases() {
        for (field, aliases) in FIELD_ALIASES {
            assert!(!aliases.is_empty(), "{field:?} has no aliases");
        }
        assert_eq!(FIELD_ALIASES.len(), 20);
    }
}
