//! CSV export of a period's ticket records.
//!
//! Column names follow the spreadsheet's own vocabulary so exported files can
//! be pasted back next to the source sheet. Every field is quoted.

use crate::models::TicketRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::io;

pub const EXPORT_COLUMNS: [&str; 19] = [
    "timestamp",
    "ticketId",
    "nome",
    "email",
    "assunto",
    "totalTickets",
    "urgente",
    "vip",
    "especializado",
    "scoreRisco",
    "scoreRecorrencia",
    "classificacao",
    "cancelou",
    "integracao",
    "problemaPagamento",
    "clienteDesde",
    "diasCliente",
    "status",
    "prazo",
];

/// One output line, in [`EXPORT_COLUMNS`] order.
#[derive(Serialize)]
struct ExportRow<'a> {
    timestamp: String,
    ticket_id: String,
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    total_tickets: i32,
    urgent: &'static str,
    vip: &'static str,
    specialized: &'static str,
    risk_score: &'a str,
    recurrence_score: &'a str,
    classification: &'a str,
    cancelled_before: &'static str,
    needed_integration: &'static str,
    payment_issue: &'static str,
    customer_since: String,
    days_as_customer: i32,
    status: &'a str,
    deadline: String,
}

impl<'a> From<&'a TicketRecord> for ExportRow<'a> {
    fn from(r: &'a TicketRecord) -> Self {
        Self {
            timestamp: iso(Some(&r.timestamp)),
            ticket_id: r.ticket_id.map(|id| id.to_string()).unwrap_or_default(),
            name: r.name.as_deref().unwrap_or_default(),
            email: r.email.as_deref().unwrap_or_default(),
            subject: r.subject.as_deref().unwrap_or_default(),
            total_tickets: r.total_tickets,
            urgent: yes_no(r.urgent),
            vip: yes_no(r.vip),
            specialized: yes_no(r.specialized),
            risk_score: r.risk_score.as_deref().unwrap_or_default(),
            recurrence_score: r.recurrence_score.as_deref().unwrap_or_default(),
            classification: r.classification.as_deref().unwrap_or_default(),
            cancelled_before: yes_no(r.cancelled_before),
            needed_integration: yes_no(r.needed_integration),
            payment_issue: yes_no(r.payment_issue),
            customer_since: iso(r.customer_since.as_ref()),
            days_as_customer: r.days_as_customer,
            status: r.status.as_deref().unwrap_or_default(),
            deadline: iso(r.deadline.as_ref()),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "SIM"
    } else {
        "NÃO"
    }
}

fn iso(time: Option<&DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Render records as CSV. An empty slice yields the header line only.
pub fn records_to_csv(records: &[TicketRecord]) -> Result<String, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.write_record(EXPORT_COLUMNS)?;
    for record in records {
        wtr.serialize(ExportRow::from(record))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRow;
    use crate::period::Period;
    use crate::records::build_record;
    use chrono::TimeZone;

    fn record(pairs: &[(&str, &str)]) -> TicketRecord {
        let row: RawRow = pairs.iter().copied().collect();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        build_record(&row, 0, Period::Last30Days, now).unwrap().unwrap()
    }

    #[test]
    fn test_empty_export_is_header_only() {
        let csv = records_to_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("\"timestamp\",\"ticketId\",\"nome\""));
        assert!(csv.ends_with("\"prazo\"\n"));
    }

    #[test]
    fn test_row_formatting() {
        let r = record(&[
            ("id", "42"),
            ("nome", "Ana \"Bia\" Souza"),
            ("flag_urgente", "SIM"),
            ("cliente_desde", "2023-01-15"),
        ]);
        let csv = records_to_csv(&[r]).unwrap();
        let line = csv.lines().nth(1).unwrap();
        assert!(line.starts_with(
            "\"2024-06-01T12:00:00.000Z\",\"42\",\"Ana \"\"Bia\"\" Souza\",\"\",\"\",\"0\",\"SIM\",\"NÃO\""
        ));
        assert!(line.contains("\"2023-01-15T00:00:00.000Z\""));
        assert!(line.ends_with(",\"0\",\"\",\"\""));
    }

    #[test]
    fn test_zero_ticket_id_exported_blank() {
        let r = record(&[("flag_vip", "SIM")]);
        let csv = records_to_csv(&[r]).unwrap();
        let line = csv.lines().nth(1).unwrap();
        assert!(line.starts_with("\"2024-06-01T12:00:00.000Z\",\"\","));
    }
}
