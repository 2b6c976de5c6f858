//! Customer profitability analysis
//!
//! Records are grouped by customer email. A customer is profitable when they
//! are VIP or specialized, or when none of their tickets was urgent, high
//! risk or from a previously cancelled account. VIP and specialized status
//! override every negative signal.
//!
//! Records without an email take no part in grouping but still count toward
//! the ticket totals, effort rate and estimated cost.

use crate::metrics::{percentage, round2};
use crate::models::{ProfitabilityAnalysis, TicketRecord};
use crate::period::Period;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_UNIT_COST: f64 = 10.0;

/// Per-customer accumulation of one period's tickets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub email: String,
    pub tickets: u32,
    pub urgent: bool,
    pub vip: bool,
    pub specialized: bool,
    pub cancelled_before: bool,
    pub high_risk: bool,
    pub high_recurrence: bool,
}

impl CustomerProfile {
    fn absorb(&mut self, record: &TicketRecord) {
        self.tickets += 1;
        self.urgent |= record.urgent;
        self.vip |= record.vip;
        self.specialized |= record.specialized;
        self.cancelled_before |= record.cancelled_before;
        self.high_risk |= record.is_high_risk();
        self.high_recurrence |= record.is_high_recurrence();
    }

    pub fn is_profitable(&self) -> bool {
        self.vip || self.specialized || (!self.urgent && !self.high_risk && !self.cancelled_before)
    }

    pub fn score(&self) -> u32 {
        if self.vip {
            100
        } else if self.specialized {
            80
        } else {
            50
        }
    }
}

/// Group records by email, ordered by email.
pub fn customer_profiles(records: &[TicketRecord]) -> Vec<CustomerProfile> {
    let mut by_email: BTreeMap<&str, CustomerProfile> = BTreeMap::new();
    for record in records {
        let Some(email) = record.customer_email() else {
            continue;
        };
        by_email
            .entry(email)
            .or_insert_with(|| CustomerProfile {
                email: email.to_string(),
                ..Default::default()
            })
            .absorb(record);
    }
    by_email.into_values().collect()
}

pub fn analyze_profitability(
    period: Period,
    records: &[TicketRecord],
    unit_cost: f64,
) -> ProfitabilityAnalysis {
    let profiles = customer_profiles(records);
    let profitable = profiles.iter().filter(|p| p.is_profitable()).count() as u32;

    let total_tickets = records.len() as u32;
    let urgent_tickets = records.iter().filter(|r| r.urgent).count() as u32;
    let vip_tickets = records.iter().filter(|r| r.vip).count() as u32;

    let average_score = if profiles.is_empty() {
        0.0
    } else {
        let sum: u32 = profiles.iter().map(CustomerProfile::score).sum();
        round2(f64::from(sum) / profiles.len() as f64)
    };

    ProfitabilityAnalysis {
        period,
        total_clients: profiles.len() as u32,
        profitable_clients: profitable,
        unprofitable_clients: profiles.len() as u32 - profitable,
        total_tickets,
        urgent_tickets,
        vip_tickets,
        effort_rate: percentage(urgent_tickets, total_tickets),
        estimated_cost: round2(f64::from(total_tickets) * unit_cost),
        average_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn ticket(email: Option<&str>) -> TicketRecord {
        TicketRecord {
            period: Period::Last30Days,
            timestamp: now(),
            ticket_id: Some(1),
            name: None,
            email: email.map(str::to_string),
            subject: None,
            total_tickets: 0,
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
            days_as_customer: 0,
            status: None,
            deadline: None,
        }
    }

    #[test]
    fn test_vip_overrides_urgent() {
        let mut t = ticket(Some("vip@x.com"));
        t.vip = true;
        t.urgent = true;
        let profiles = customer_profiles(&[t]);
        assert!(profiles[0].is_profitable());
    }

    #[test]
    fn test_urgent_plain_customer_unprofitable() {
        let mut t = ticket(Some("plain@x.com"));
        t.urgent = true;
        let a = analyze_profitability(Period::Last30Days, &[t], DEFAULT_UNIT_COST);
        assert_eq!(a.profitable_clients, 0);
        assert_eq!(a.unprofitable_clients, 1);
    }

    #[test]
    fn test_flags_or_reduce_across_tickets() {
        let calm = ticket(Some("c@x.com"));
        let mut risky = ticket(Some("c@x.com"));
        risky.risk_score = Some("ALTO".into());
        let profiles = customer_profiles(&[calm, risky]);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].tickets, 2);
        assert!(profiles[0].high_risk);
        assert!(!profiles[0].is_profitable());
    }

    #[test]
    fn test_emailless_records_count_in_totals_only() {
        let mut anon = ticket(None);
        anon.urgent = true;
        let mut vip = ticket(Some("v@x.com"));
        vip.vip = true;
        let spec = {
            let mut t = ticket(Some("s@x.com"));
            t.specialized = true;
            t
        };
        let plain = ticket(Some("p@x.com"));

        let a = analyze_profitability(Period::Last30Days, &[anon, vip, spec, plain], 10.0);
        assert_eq!(a.total_clients, 3);
        assert_eq!(a.total_tickets, 4);
        assert_eq!(a.urgent_tickets, 1);
        assert_eq!(a.vip_tickets, 1);
        assert_eq!(a.effort_rate, 25.0);
        assert_eq!(a.estimated_cost, 40.0);
        assert_eq!(a.average_score, 76.67);
    }

    #[test]
    fn test_empty_period() {
        let a = analyze_profitability(Period::LastYear, &[], 10.0);
        assert_eq!(a.total_clients, 0);
        assert_eq!(a.effort_rate, 0.0);
        assert_eq!(a.average_score, 0.0);
        assert_eq!(a.estimated_cost, 0.0);
    }
}
