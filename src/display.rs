//! Output Formatting and Display Management
//!
//! Renders query results either as coloured terminal reports or as JSON for
//! programmatic consumption. JSON output always wraps the payload in a single
//! top-level key named after the report (`{"metrics": {...}}`).
//!
//! ## Key Types
//!
//! - [`DisplayManager`] - Main interface for all display operations

use crate::models::{PerformanceMetrics, ProfitabilityAnalysis, Snapshot, TicketRecord};
use crate::orchestrator::RefreshOutcome;
use crate::period::Period;
use colored::Colorize;
use serde::Serialize;

pub struct DisplayManager {
    json_output: bool,
}

impl DisplayManager {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    fn emit_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let mut output = serde_json::Map::new();
        match serde_json::to_value(value) {
            Ok(v) => {
                output.insert(key.to_string(), v);
            }
            Err(e) => {
                eprintln!("Error serializing {} to JSON: {}", key, e);
                return;
            }
        }
        match serde_json::to_string_pretty(&output) {
            Ok(json_str) => println!("{}", json_str),
            Err(e) => eprintln!("Error serializing {} to JSON: {}", key, e),
        }
    }

    fn header(&self, title: &str) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        println!("{}", title.bright_white().bold());
        println!("{}", "=".repeat(80).bright_cyan());
    }

    pub fn display_outcome(&self, outcome: &RefreshOutcome) {
        if self.json_output {
            self.emit_json("refresh", outcome);
            return;
        }

        if outcome.is_empty() {
            println!(
                "{} {} returned no rows; stored data left unchanged",
                "⚠️".bright_yellow(),
                outcome.period.label().bright_white().bold()
            );
            return;
        }

        println!(
            "{} {} refreshed from {} • {} rows • {} records • {} discarded",
            "🔄".bright_blue(),
            outcome.period.label().bright_white().bold(),
            outcome.source.as_str().bright_cyan(),
            outcome.raw_rows.to_string().bright_white(),
            outcome.records.to_string().bright_green().bold(),
            outcome.discarded.to_string().bright_white()
        );
        for err in &outcome.row_errors {
            println!("   {} {}", "skipped".bright_red(), err);
        }
    }

    pub fn display_metrics(&self, m: &PerformanceMetrics) {
        if self.json_output {
            self.emit_json("metrics", m);
            return;
        }

        self.header(&format!("Performance Metrics - {}", m.period.label()));
        println!(
            "\n{} {} tickets • {} open • {} closed\n",
            "📊".bright_yellow(),
            m.total_tickets.to_string().bright_white().bold(),
            m.open_tickets.to_string().bright_yellow(),
            m.closed_tickets.to_string().bright_green()
        );
        println!("   Resolution rate:   {}", pct(m.resolution_rate).bright_green().bold());
        println!("   Cancellation rate: {}", pct(m.cancellation_rate).bright_red());
        println!();
        println!("   Urgent:       {}", m.urgent_tickets.to_string().bright_red());
        println!("   VIP:          {}", m.vip_tickets.to_string().bright_magenta());
        println!("   Specialized:  {}", m.specialized_tickets.to_string().bright_cyan());
        println!("   Cancelled:    {}", m.cancelled_tickets.to_string().bright_white());
        println!();
        println!(
            "   Customers: {} ({} new)",
            m.total_customers.to_string().bright_white().bold(),
            m.new_customers.to_string().bright_green()
        );
        println!(
            "   High risk: {} • High recurrence: {}",
            m.high_risk_count.to_string().bright_red(),
            m.high_recurrence_count.to_string().bright_yellow()
        );
    }

    pub fn display_profitability(&self, a: &ProfitabilityAnalysis) {
        if self.json_output {
            self.emit_json("profitability", a);
            return;
        }

        self.header(&format!("Profitability Analysis - {}", a.period.label()));
        println!(
            "\n{} {} customers • {} profitable • {} unprofitable\n",
            "💰".bright_yellow(),
            a.total_clients.to_string().bright_white().bold(),
            a.profitable_clients.to_string().bright_green().bold(),
            a.unprofitable_clients.to_string().bright_red()
        );
        println!(
            "   Tickets: {} ({} urgent, {} VIP)",
            a.total_tickets.to_string().bright_white(),
            a.urgent_tickets.to_string().bright_red(),
            a.vip_tickets.to_string().bright_magenta()
        );
        println!("   Effort rate:    {}", pct(a.effort_rate).bright_yellow());
        println!(
            "   Estimated cost: {}",
            format!("${:.2}", a.estimated_cost).bright_green().bold()
        );
        println!("   Average score:  {}", format!("{:.2}", a.average_score).bright_white());
    }

    pub fn display_tickets(&self, period: Period, tickets: &[TicketRecord]) {
        if self.json_output {
            self.emit_json("tickets", tickets);
            return;
        }

        self.header(&format!("Tickets - {}", period.label()));
        println!(
            "\n{} {} tickets (newest first)\n",
            "🎫".bright_blue(),
            tickets.len().to_string().bright_white().bold()
        );

        for t in tickets {
            let id = t
                .ticket_id
                .map(|id| format!("#{id}"))
                .unwrap_or_else(|| "#-".to_string());
            let mut tags = Vec::new();
            if t.urgent {
                tags.push("URGENT".bright_red().to_string());
            }
            if t.vip {
                tags.push("VIP".bright_magenta().to_string());
            }
            if t.specialized {
                tags.push("SPECIALIZED".bright_cyan().to_string());
            }
            println!(
                "{} {} {} {} {}",
                id.bright_white().bold(),
                t.timestamp.format("%Y-%m-%d %H:%M").to_string().bright_blue(),
                t.name.as_deref().unwrap_or("-"),
                t.status.as_deref().unwrap_or("-").bright_yellow(),
                tags.join(" ")
            );
            if let Some(subject) = &t.subject {
                println!("   {}", subject);
            }
        }
    }

    pub fn display_snapshot(&self, snapshot: Option<&Snapshot>) {
        if self.json_output {
            let rows = snapshot.map(|s| s.rows.as_slice()).unwrap_or_default();
            self.emit_json("latest", rows);
            return;
        }

        let Some(snapshot) = snapshot else {
            println!("{} No snapshots ingested yet", "📋".bright_yellow());
            return;
        };

        self.header(&format!("Latest snapshot #{}", snapshot.id));
        println!(
            "   {} from {} • {} rows\n",
            snapshot.created_at.to_rfc3339().bright_blue(),
            snapshot.source.as_str().bright_cyan(),
            snapshot.rows.len().to_string().bright_white().bold()
        );
        for (i, row) in snapshot.rows.iter().enumerate() {
            println!("{}", format!("row {}", i + 1).bright_white().bold());
            for (key, value) in row.iter() {
                println!("   {}: {}", key.bright_cyan(), value);
            }
        }
    }

    pub fn display_snapshots(&self, snapshots: &[Snapshot]) {
        if self.json_output {
            let summary: Vec<_> = snapshots
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "source": s.source,
                        "rows": s.rows.len(),
                        "createdAt": s.created_at,
                    })
                })
                .collect();
            self.emit_json("imports", &summary);
            return;
        }

        self.header("Recent imports");
        for s in snapshots {
            println!(
                "   #{} {} {} ({} rows)",
                s.id.to_string().bright_white().bold(),
                s.created_at.format("%Y-%m-%d %H:%M:%S").to_string().bright_blue(),
                s.source.as_str().bright_cyan(),
                s.rows.len()
            );
        }
    }
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value)
}
