//! Recurring invoice generation.
//!
//! One run bills every active lease of an org for a target month. The run is
//! split into a pure planning step (testable without a database) and an
//! execution step that inserts the planned invoices one by one, so a single
//! bad lease never poisons the rest of the batch.

use crate::models::Lease;
use crate::services::database::{Database, GeneratedInsert};
use crate::services::metrics::{ERRORS_TOTAL, GENERATED_INVOICES_TOTAL, GENERATION_RUNS_TOTAL};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How a generation run treats a lease whose tenant reference no longer
/// resolves (deleted tenant, moved property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingReferencePolicy {
    /// Skip the lease, record the problem in the run report, keep going.
    #[default]
    SkipAndReport,
    /// Fail the whole run on the first broken reference.
    Abort,
}

impl MissingReferencePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skip_and_report" => Some(MissingReferencePolicy::SkipAndReport),
            "abort" => Some(MissingReferencePolicy::Abort),
            _ => None,
        }
    }
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    // from_ymd_opt cannot fail for day 1 of an existing month
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// First day of the month after `start`.
pub fn next_month_start(start: NaiveDate) -> NaiveDate {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start)
}

/// Human-readable month label, e.g. "March 2025".
pub fn month_label(start: NaiveDate) -> String {
    start.format("%B %Y").to_string()
}

/// Invoice number for generated invoices:
/// `INV-<org prefix>-<yyyymm>-<sequence>`. The per-month sequence makes
/// retries produce the same numbers; uniqueness is still enforced by the
/// `(org_id, invoice_number)` constraint.
pub fn recurring_invoice_number(org_id: Uuid, start: NaiveDate, sequence: i64) -> String {
    let simple = org_id.simple().to_string();
    let prefix: String = simple.chars().take(6).collect::<String>().to_uppercase();
    format!(
        "INV-{}-{}{:02}-{:04}",
        prefix,
        start.year(),
        start.month(),
        sequence
    )
}

/// One invoice a generation run intends to insert.
#[derive(Debug, Clone)]
pub struct PlannedInvoice {
    pub org_id: Uuid,
    pub lease_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub invoice_number: String,
    pub title: String,
    pub line_description: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// Pure output of the planning step.
#[derive(Debug, Clone, Default)]
pub struct GenerationPlan {
    pub to_create: Vec<PlannedInvoice>,
    /// Leases that already carry a live invoice for the month.
    pub skipped: u64,
}

/// Outcome of a full generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub created: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

/// Decide which leases to bill for the month starting at `start`.
///
/// A lease is skipped when it already appears in `already_billed` (a live,
/// non-terminal invoice exists for this month) or when the lease ended
/// before the month begins. Sequence numbers continue from `sequence_seed`,
/// in lease order, so a retried run numbers its new invoices the same way.
pub fn plan_generation(
    org_id: Uuid,
    start: NaiveDate,
    leases: &[Lease],
    already_billed: &HashSet<Uuid>,
    sequence_seed: i64,
) -> GenerationPlan {
    let label = month_label(start);
    let mut plan = GenerationPlan::default();
    let mut sequence = sequence_seed;

    for lease in leases {
        if already_billed.contains(&lease.lease_id) {
            plan.skipped += 1;
            continue;
        }
        if lease.end_date.is_some_and(|end| end < start) {
            continue;
        }

        sequence += 1;
        plan.to_create.push(PlannedInvoice {
            org_id,
            lease_id: lease.lease_id,
            tenant_id: lease.tenant_id,
            property_id: lease.property_id,
            invoice_number: recurring_invoice_number(org_id, start, sequence),
            title: format!("Rent for {}", label),
            line_description: format!("Monthly rent, {}", label),
            amount: lease.rent_amount,
            due_date: start,
        });
    }

    plan
}

/// Run recurring generation for an org. Any day within the target month
/// selects it; `for_month` defaults to the next calendar month, the usual
/// billing cadence of running near the end of the current one.
#[instrument(skip(db), fields(org_id = %org_id))]
pub async fn run_generation(
    db: &Database,
    org_id: Uuid,
    for_month: Option<NaiveDate>,
    policy: MissingReferencePolicy,
    now: DateTime<Utc>,
) -> Result<GenerationOutcome, AppError> {
    let start = match for_month {
        Some(day) => month_start(day),
        None => next_month_start(month_start(now.date_naive())),
    };
    let next_start = next_month_start(start);

    let leases = db.list_active_leases(org_id).await?;
    let already_billed = db.lease_ids_billed_for_month(org_id, start).await?;
    let sequence_seed = db.count_invoices_for_month(org_id, start, next_start).await?;

    let plan = plan_generation(org_id, start, &leases, &already_billed, sequence_seed);

    info!(
        month = %month_label(start),
        leases = leases.len(),
        planned = plan.to_create.len(),
        already_billed = plan.skipped,
        "Starting recurring generation"
    );

    let mut outcome = GenerationOutcome {
        skipped: plan.skipped,
        ..Default::default()
    };

    for planned in &plan.to_create {
        match db
            .verify_tenant_reference(org_id, planned.tenant_id, planned.property_id)
            .await
        {
            Ok(_) => {}
            Err(AppError::InvalidReference(reason)) => {
                warn!(
                    lease_id = %planned.lease_id,
                    tenant_id = %planned.tenant_id,
                    "Skipping lease with broken tenant reference"
                );
                ERRORS_TOTAL
                    .with_label_values(&["missing_reference"])
                    .inc();
                match policy {
                    MissingReferencePolicy::SkipAndReport => {
                        outcome
                            .errors
                            .push(format!("lease {}: {}", planned.lease_id, reason));
                        continue;
                    }
                    MissingReferencePolicy::Abort => {
                        GENERATION_RUNS_TOTAL.with_label_values(&["failed"]).inc();
                        return Err(AppError::InvalidReference(anyhow::anyhow!(
                            "lease {}: {}",
                            planned.lease_id,
                            reason
                        )));
                    }
                }
            }
            Err(e) => {
                GENERATION_RUNS_TOTAL.with_label_values(&["failed"]).inc();
                return Err(e);
            }
        }

        match db.insert_generated_invoice(planned, now).await? {
            GeneratedInsert::Created(_) => {
                GENERATED_INVOICES_TOTAL.with_label_values(&["created"]).inc();
                outcome.created += 1;
            }
            GeneratedInsert::DuplicateSkipped => {
                GENERATED_INVOICES_TOTAL.with_label_values(&["skipped"]).inc();
                outcome.skipped += 1;
            }
        }
    }

    GENERATION_RUNS_TOTAL.with_label_values(&["completed"]).inc();

    info!(
        created = outcome.created,
        skipped = outcome.skipped,
        errors = outcome.errors.len(),
        "Recurring generation finished"
    );

    Ok(outcome)
}
