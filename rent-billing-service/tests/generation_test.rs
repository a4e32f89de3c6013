//! Planning-step behavior of recurring generation.

use chrono::{NaiveDate, TimeZone, Utc};
use rent_billing_service::models::{Lease, LeaseStatus};
use rent_billing_service::services::generation::{
    month_label, month_start, next_month_start, plan_generation, recurring_invoice_number,
    MissingReferencePolicy,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn lease(org_id: Uuid, rent: i64) -> Lease {
    Lease {
        lease_id: Uuid::new_v4(),
        org_id,
        tenant_id: Uuid::new_v4(),
        property_id: Uuid::new_v4(),
        rent_amount: Decimal::from(rent),
        status: LeaseStatus::Active.as_str().to_string(),
        start_date: date(2024, 1, 1),
        end_date: None,
        created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

#[test]
fn plans_one_invoice_per_active_lease() {
    let org_id = Uuid::new_v4();
    let leases = vec![lease(org_id, 1200), lease(org_id, 950), lease(org_id, 2000)];
    let start = date(2025, 3, 1);

    let plan = plan_generation(org_id, start, &leases, &HashSet::new(), 0);

    assert_eq!(plan.to_create.len(), 3);
    assert_eq!(plan.skipped, 0);

    let first = &plan.to_create[0];
    assert_eq!(first.lease_id, leases[0].lease_id);
    assert_eq!(first.amount, Decimal::from(1200));
    assert_eq!(first.due_date, start);
    assert_eq!(first.title, "Rent for March 2025");
}

#[test]
fn rerun_in_same_month_skips_every_billed_lease() {
    let org_id = Uuid::new_v4();
    let leases = vec![lease(org_id, 1200), lease(org_id, 950)];
    let start = date(2025, 3, 1);

    let first_run = plan_generation(org_id, start, &leases, &HashSet::new(), 0);
    assert_eq!(first_run.to_create.len(), 2);

    // Everything the first run created is now billed.
    let billed: HashSet<Uuid> = leases.iter().map(|l| l.lease_id).collect();
    let second_run = plan_generation(org_id, start, &leases, &billed, 2);

    assert!(second_run.to_create.is_empty());
    assert_eq!(second_run.skipped, 2);
}

#[test]
fn paid_invoice_does_not_block_rebilling() {
    // A lease whose invoice for the month was paid (or cancelled) is not in
    // the billed set, so a rerun plans it again.
    let org_id = Uuid::new_v4();
    let leases = vec![lease(org_id, 1200), lease(org_id, 950)];
    let start = date(2025, 3, 1);

    let mut billed = HashSet::new();
    billed.insert(leases[1].lease_id);

    let plan = plan_generation(org_id, start, &leases, &billed, 1);

    assert_eq!(plan.to_create.len(), 1);
    assert_eq!(plan.to_create[0].lease_id, leases[0].lease_id);
    assert_eq!(plan.skipped, 1);
}

#[test]
fn lease_ended_before_the_month_is_not_billed() {
    let org_id = Uuid::new_v4();
    let mut ended = lease(org_id, 1200);
    ended.end_date = Some(date(2025, 2, 28));
    let still_running = lease(org_id, 950);

    let plan = plan_generation(
        org_id,
        date(2025, 3, 1),
        &[ended, still_running.clone()],
        &HashSet::new(),
        0,
    );

    assert_eq!(plan.to_create.len(), 1);
    assert_eq!(plan.to_create[0].lease_id, still_running.lease_id);
}

#[test]
fn sequence_continues_from_the_seed() {
    let org_id = Uuid::new_v4();
    let leases = vec![lease(org_id, 1200), lease(org_id, 950)];
    let start = date(2025, 3, 1);

    let plan = plan_generation(org_id, start, &leases, &HashSet::new(), 5);

    assert!(plan.to_create[0].invoice_number.ends_with("-202503-0006"));
    assert!(plan.to_create[1].invoice_number.ends_with("-202503-0007"));
}

#[test]
fn recurring_number_embeds_org_prefix_and_month() {
    let org_id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
    let number = recurring_invoice_number(org_id, date(2025, 3, 1), 12);
    assert_eq!(number, "INV-A1B2C3-202503-0012");
}

#[test]
fn month_helpers_handle_year_boundaries() {
    assert_eq!(month_start(date(2025, 12, 31)), date(2025, 12, 1));
    assert_eq!(next_month_start(date(2025, 12, 1)), date(2026, 1, 1));
    assert_eq!(next_month_start(date(2025, 3, 1)), date(2025, 4, 1));
    assert_eq!(month_label(date(2025, 3, 1)), "March 2025");
}

#[test]
fn missing_reference_policy_parses_known_values() {
    assert_eq!(
        MissingReferencePolicy::parse("skip_and_report"),
        Some(MissingReferencePolicy::SkipAndReport)
    );
    assert_eq!(
        MissingReferencePolicy::parse("abort"),
        Some(MissingReferencePolicy::Abort)
    );
    assert_eq!(MissingReferencePolicy::parse("explode"), None);
}
