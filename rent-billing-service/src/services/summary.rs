//! Summary reporting over an org's invoices.
//!
//! Pure aggregation: the caller loads the invoices, this module folds them.
//! All status-dependent figures use the derived status as of `today`, so a
//! stored `sent` invoice past its due date counts as overdue here even if
//! nothing has rewritten the row yet.

use crate::models::{Invoice, InvoiceStatus};
use crate::services::generation::month_start;
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Current-month billing compared against the previous month, by issue date.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthOverMonth {
    pub current_month_total: Decimal,
    pub current_month_count: u64,
    pub previous_month_total: Decimal,
    pub previous_month_count: u64,
    /// Percent growth, two decimal places. Zero when the previous month
    /// billed nothing; a from-nothing jump has no meaningful percentage.
    pub growth_percent: Decimal,
}

/// Aging of the currently overdue invoices.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueAging {
    pub count: u64,
    pub amount: Decimal,
    /// Mean days past due, rounded to the nearest whole day.
    pub average_days_overdue: i64,
}

/// Org-wide invoice summary.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub total_count: u64,
    pub total_amount: Decimal,
    pub paid_count: u64,
    pub paid_amount: Decimal,
    /// Everything billed but not yet collected: `total - paid`.
    pub pending_amount: Decimal,
    pub overdue_count: u64,
    pub overdue_amount: Decimal,
    /// Paid invoices as a percentage of all invoices, two decimal places.
    pub collection_rate_percent: Decimal,
    pub month_over_month: MonthOverMonth,
    pub status_distribution: BTreeMap<String, u64>,
    pub category_distribution: BTreeMap<String, u64>,
    pub overdue_aging: OverdueAging,
}

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Fold a set of invoices into the summary, as of `today`.
pub fn compute_summary(invoices: &[Invoice], today: NaiveDate) -> InvoiceSummary {
    let mut summary = InvoiceSummary::default();

    let current_start = month_start(today);
    let previous_start = previous_month_start(current_start);

    let mut overdue_days_total: i64 = 0;

    for invoice in invoices {
        let status = invoice.derived_status(today);

        summary.total_count += 1;
        summary.total_amount += invoice.total_amount;

        *summary
            .status_distribution
            .entry(status.as_str().to_string())
            .or_insert(0) += 1;
        *summary
            .category_distribution
            .entry(invoice.category.clone())
            .or_insert(0) += 1;

        match status {
            InvoiceStatus::Paid => {
                summary.paid_count += 1;
                summary.paid_amount += invoice.total_amount;
            }
            InvoiceStatus::Overdue => {
                summary.overdue_count += 1;
                summary.overdue_amount += invoice.total_amount;
                overdue_days_total += (today - invoice.due_date).num_days();
            }
            _ => {}
        }

        let issue_start = month_start(invoice.issue_date);
        if issue_start == current_start {
            summary.month_over_month.current_month_total += invoice.total_amount;
            summary.month_over_month.current_month_count += 1;
        } else if issue_start == previous_start {
            summary.month_over_month.previous_month_total += invoice.total_amount;
            summary.month_over_month.previous_month_count += 1;
        }
    }

    summary.pending_amount = summary.total_amount - summary.paid_amount;

    if summary.total_count > 0 {
        summary.collection_rate_percent = (Decimal::from(summary.paid_count)
            / Decimal::from(summary.total_count)
            * HUNDRED)
            .round_dp(2);
    }

    let mom = &mut summary.month_over_month;
    if mom.previous_month_total > Decimal::ZERO {
        mom.growth_percent = ((mom.current_month_total - mom.previous_month_total)
            / mom.previous_month_total
            * HUNDRED)
            .round_dp(2);
    }

    summary.overdue_aging = OverdueAging {
        count: summary.overdue_count,
        amount: summary.overdue_amount,
        average_days_overdue: if summary.overdue_count > 0 {
            // Half days round up, not to even.
            (Decimal::from(overdue_days_total) / Decimal::from(summary.overdue_count))
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(0)
        } else {
            0
        },
    };

    summary
}

/// First day of the month before `start`, crossing year boundaries.
fn previous_month_start(start: NaiveDate) -> NaiveDate {
    let (year, month) = if start.month() == 1 {
        (start.year() - 1, 12)
    } else {
        (start.year(), start.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_month_crosses_year_boundary() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(
            previous_month_start(jan),
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
        );
    }
}
