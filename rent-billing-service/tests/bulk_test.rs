//! Bulk batch resolution: all-or-nothing before anything is applied.

use chrono::{NaiveDate, TimeZone, Utc};
use rent_billing_service::handlers::bulk::{dedupe_ids, ensure_all_resolved};
use rent_billing_service::models::{Invoice, InvoiceCategory, InvoicePriority, InvoiceStatus};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn invoice(invoice_id: Uuid, org_id: Uuid) -> Invoice {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    Invoice {
        invoice_id,
        org_id,
        invoice_number: "INV-1-0001".to_string(),
        tenant_id: Uuid::new_v4(),
        property_id: Uuid::new_v4(),
        lease_id: None,
        created_by: None,
        title: None,
        category: InvoiceCategory::Rent.as_str().to_string(),
        priority: InvoicePriority::Medium.as_str().to_string(),
        status: InvoiceStatus::Sent.as_str().to_string(),
        subtotal: Decimal::from(1000),
        tax_amount: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        total_amount: Decimal::from(1000),
        issue_date: date(2025, 3, 1),
        due_date: date(2025, 3, 31),
        sent_at: None,
        viewed_at: None,
        paid_at: None,
        is_recurring: false,
        frequency: None,
        next_invoice_date: None,
        recurrence_end_date: None,
        notes: None,
        payment_terms: None,
        attachments: sqlx::types::Json(Vec::new()),
        created_utc: now,
        updated_utc: now,
    }
}

#[test]
fn one_unresolvable_id_rejects_the_whole_batch() {
    let org_id = Uuid::new_v4();
    let known = Uuid::new_v4();
    let foreign = Uuid::new_v4();

    // The foreign id resolves in another org, so the lookup returns only
    // the known invoice.
    let requested = vec![known, foreign];
    let found = vec![invoice(known, org_id)];

    let err = ensure_all_resolved(&requested, &found).unwrap_err();
    match err {
        AppError::NotFound(reason) => {
            assert!(reason.to_string().contains(&foreign.to_string()));
            assert!(!reason.to_string().contains(&known.to_string()));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn fully_resolved_batch_is_accepted() {
    let org_id = Uuid::new_v4();
    let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let found: Vec<Invoice> = ids.iter().map(|id| invoice(*id, org_id)).collect();

    assert!(ensure_all_resolved(&ids, &found).is_ok());
}

#[test]
fn empty_batch_resolves_trivially() {
    assert!(ensure_all_resolved(&[], &[]).is_ok());
}

#[test]
fn duplicate_ids_collapse_preserving_order() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert_eq!(dedupe_ids(&[a, b, a, b, a]), vec![a, b]);
}

#[test]
fn deduped_batch_with_a_miss_still_rejects() {
    let org_id = Uuid::new_v4();
    let known = Uuid::new_v4();
    let foreign = Uuid::new_v4();

    let ids = dedupe_ids(&[known, foreign, known]);
    let found = vec![invoice(known, org_id)];

    assert!(matches!(
        ensure_all_resolved(&ids, &found),
        Err(AppError::NotFound(_))
    ));
}
