//! Period performance metrics
//!
//! Pure aggregation over one period's full record set. The orchestrator
//! upserts the result keyed by period, so a recompute always replaces the
//! previous row rather than merging into it. The output depends only on the
//! records: re-ingesting unchanged data yields an identical row.

use crate::models::{PerformanceMetrics, TicketRecord};
use crate::period::Period;
use std::collections::HashSet;

/// Customers at most this many days old count as new.
pub const NEW_CUSTOMER_DAYS: i32 = 30;

pub fn compute_metrics(period: Period, records: &[TicketRecord]) -> PerformanceMetrics {
    let count = |pred: fn(&TicketRecord) -> bool| records.iter().filter(|r| pred(r)).count() as u32;

    let total_tickets = records.len() as u32;
    let open_tickets = count(TicketRecord::is_open);
    let closed_tickets = total_tickets - open_tickets;
    let cancelled_tickets = count(|r| r.cancelled_before);

    let customers: HashSet<&str> = records.iter().filter_map(|r| r.customer_email()).collect();

    PerformanceMetrics {
        period,
        total_tickets,
        open_tickets,
        closed_tickets,
        urgent_tickets: count(|r| r.urgent),
        vip_tickets: count(|r| r.vip),
        specialized_tickets: count(|r| r.specialized),
        cancelled_tickets,
        resolution_rate: percentage(closed_tickets, total_tickets),
        cancellation_rate: percentage(cancelled_tickets, total_tickets),
        total_customers: customers.len() as u32,
        new_customers: count(|r| r.days_as_customer <= NEW_CUSTOMER_DAYS),
        high_risk_count: count(TicketRecord::is_high_risk),
        high_recurrence_count: count(TicketRecord::is_high_recurrence),
    }
}

/// `part / whole * 100` rounded to two decimals; 0 when `whole` is 0.
pub fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(f64::from(part) / f64::from(whole) * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn record(status: &str) -> TicketRecord {
        TicketRecord {
            period: Period::Last30Days,
            timestamp: now(),
            ticket_id: Some(1),
            name: None,
            email: None,
            subject: None,
            total_tickets: 1,
            urgent: false,
            vip: false,
            specialized: false,
            cancelled_before: false,
            needed_integration: false,
            payment_issue: false,
            risk_score: None,
            recurrence_score: None,
            classification: None,
            recommendation: None,
            customer_since: None,
            days_as_customer: 365,
            status: Some(status.to_string()),
            deadline: None,
        }
    }

    #[test]
    fn test_empty_set_has_zero_rates() {
        let m = compute_metrics(Period::Last30Days, &[]);
        assert_eq!(m.total_tickets, 0);
        assert_eq!(m.resolution_rate, 0.0);
        assert_eq!(m.cancellation_rate, 0.0);
        assert!(!m.resolution_rate.is_nan());
    }

    #[test]
    fn test_resolution_rate_forty_percent() {
        let mut records: Vec<_> = (0..6).map(|_| record("Open")).collect();
        records.extend((0..4).map(|_| record("Closed")));
        let m = compute_metrics(Period::Last30Days, &records);
        assert_eq!(m.open_tickets, 6);
        assert_eq!(m.closed_tickets, 4);
        assert_eq!(m.resolution_rate, 40.00);
    }

    #[test]
    fn test_status_two_counts_as_open() {
        let records = vec![record("2"), record("5")];
        let m = compute_metrics(Period::Last30Days, &records);
        assert_eq!(m.open_tickets, 1);
        assert_eq!(m.closed_tickets, 1);
    }

    #[test]
    fn test_rates_rounded_to_two_decimals() {
        let mut records: Vec<_> = (0..3).map(|_| record("Closed")).collect();
        records[0].cancelled_before = true;
        let m = compute_metrics(Period::Last30Days, &records);
        assert_eq!(m.cancellation_rate, 33.33);
        assert_eq!(m.cancelled_tickets, 1);
    }

    #[test]
    fn test_customer_counts() {
        let mut a = record("Open");
        a.email = Some("a@x.com".into());
        a.days_as_customer = 10;
        let mut b = record("Open");
        b.email = Some("a@x.com".into());
        let mut c = record("Open");
        c.email = Some("c@x.com".into());
        c.days_as_customer = 30;
        let d = record("Open");

        let m = compute_metrics(Period::Last30Days, &[a, b, c, d]);
        assert_eq!(m.total_customers, 2);
        assert_eq!(m.new_customers, 2);
    }

    #[test]
    fn test_risk_and_recurrence_counts() {
        let mut a = record("Open");
        a.risk_score = Some("ALTO".into());
        a.recurrence_score = Some("ALTA".into());
        let mut b = record("Open");
        b.risk_score = Some("BAIXO".into());
        let m = compute_metrics(Period::Last30Days, &[a, b]);
        assert_eq!(m.high_risk_count, 1);
        assert_eq!(m.high_recurrence_count, 1);
    }
}
