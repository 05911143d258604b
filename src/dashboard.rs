//! Aggregate chart data over customers and their leads.
//!
//! `summarize` is pure so the server endpoint and the client-side cache
//! produce identical numbers from the same records.

use crate::models::{Customer, Lead, LeadStatus};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// Number of calendar months in the new-customer histogram.
pub const MONTHS_IN_HISTORY: usize = 6;
/// Number of customers in the top-by-value ranking.
pub const TOP_CUSTOMERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusBreakdown {
    pub status: LeadStatus,
    pub count: usize,
    #[schema(value_type = String)]
    pub value: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyCount {
    /// Calendar month as `YYYY-MM`.
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerValue {
    pub customer_id: Uuid,
    pub name: String,
    pub lead_count: usize,
    #[schema(value_type = String)]
    pub total_value: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub total_customers: usize,
    pub total_leads: usize,
    /// One entry per status, in `New, Contacted, Converted, Lost` order.
    pub by_status: Vec<StatusBreakdown>,
    /// Value of leads still open (`New` and `Contacted`).
    #[schema(value_type = String)]
    pub pipeline_value: BigDecimal,
    #[schema(value_type = String)]
    pub converted_value: BigDecimal,
    /// Converted / (converted + lost); 0.0 when nothing has closed yet.
    pub conversion_rate: f64,
    /// Oldest month first, zero filled.
    pub customers_per_month: Vec<MonthlyCount>,
    pub top_customers: Vec<CustomerValue>,
}

/// `(year, month)` pairs for the last `count` months ending at `now`, oldest first.
fn trailing_months(now: DateTime<Utc>, count: usize) -> Vec<(i32, u32)> {
    let mut year = now.year();
    let mut month = now.month();
    let mut months = Vec::with_capacity(count);
    for _ in 0..count {
        months.push((year, month));
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    months.reverse();
    months
}

fn round_rate(rate: f64) -> f64 {
    (rate * 10_000.0).round() / 10_000.0
}

/// Builds the dashboard from the customers a user can see and their leads.
///
/// Leads whose customer is not in `customers` are ignored.
pub fn summarize(customers: &[Customer], leads: &[Lead], now: DateTime<Utc>) -> DashboardSummary {
    let names: HashMap<Uuid, &str> = customers.iter().map(|c| (c.id, c.name.as_str())).collect();
    let leads: Vec<&Lead> = leads
        .iter()
        .filter(|l| names.contains_key(&l.customer_id))
        .collect();

    let by_status: Vec<StatusBreakdown> = LeadStatus::ALL
        .into_iter()
        .map(|status| {
            let matching = leads.iter().filter(|l| l.status == status);
            StatusBreakdown {
                status,
                count: matching.clone().count(),
                value: matching.fold(BigDecimal::zero(), |acc, l| acc + &l.value),
            }
        })
        .collect();

    let value_of = |status: LeadStatus| {
        by_status
            .iter()
            .find(|b| b.status == status)
            .map(|b| (b.count, b.value.clone()))
            .unwrap_or((0, BigDecimal::zero()))
    };
    let (converted_count, converted_value) = value_of(LeadStatus::Converted);
    let (lost_count, _) = value_of(LeadStatus::Lost);
    let pipeline_value = by_status
        .iter()
        .filter(|b| b.status.is_open())
        .fold(BigDecimal::zero(), |acc, b| acc + &b.value);

    let closed = converted_count + lost_count;
    let conversion_rate = if closed == 0 {
        0.0
    } else {
        round_rate(converted_count as f64 / closed as f64)
    };

    let customers_per_month = trailing_months(now, MONTHS_IN_HISTORY)
        .into_iter()
        .map(|(year, month)| MonthlyCount {
            month: format!("{:04}-{:02}", year, month),
            count: customers
                .iter()
                .filter(|c| c.created_at.year() == year && c.created_at.month() == month)
                .count(),
        })
        .collect();

    let mut per_customer: HashMap<Uuid, (usize, BigDecimal)> = HashMap::new();
    for lead in &leads {
        let entry = per_customer
            .entry(lead.customer_id)
            .or_insert_with(|| (0, BigDecimal::zero()));
        entry.0 += 1;
        entry.1 += &lead.value;
    }
    let mut top_customers: Vec<CustomerValue> = per_customer
        .into_iter()
        .map(|(customer_id, (lead_count, total_value))| CustomerValue {
            customer_id,
            name: names.get(&customer_id).copied().unwrap_or_default().to_string(),
            lead_count,
            total_value,
        })
        .collect();
    top_customers.sort_by(|a, b| {
        b.total_value
            .cmp(&a.total_value)
            .then_with(|| a.name.cmp(&b.name))
    });
    top_customers.truncate(TOP_CUSTOMERS);

    DashboardSummary {
        total_customers: customers.len(),
        total_leads: leads.len(),
        by_status,
        pipeline_value,
        converted_value,
        conversion_rate,
        customers_per_month,
        top_customers,
    }
}
