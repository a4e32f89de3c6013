//! Status machine behavior across the full lifecycle.

use chrono::{NaiveDate, TimeZone, Utc};
use rent_billing_service::models::{
    Invoice, InvoiceCategory, InvoicePriority, InvoiceStatus,
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn invoice(status: InvoiceStatus, due: NaiveDate) -> Invoice {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    Invoice {
        invoice_id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        invoice_number: "INV-1-0001".to_string(),
        tenant_id: Uuid::new_v4(),
        property_id: Uuid::new_v4(),
        lease_id: None,
        created_by: None,
        title: None,
        category: InvoiceCategory::Rent.as_str().to_string(),
        priority: InvoicePriority::Medium.as_str().to_string(),
        status: status.as_str().to_string(),
        subtotal: Decimal::from(1200),
        tax_amount: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        total_amount: Decimal::from(1200),
        issue_date: date(2025, 3, 1),
        due_date: due,
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
fn draft_to_sent_to_viewed_to_paid_happy_path() {
    let now = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();
    let mut inv = invoice(InvoiceStatus::Draft, date(2025, 3, 31));

    for to in [
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::Paid,
    ] {
        assert!(InvoiceStatus::can_transition(inv.status(), to));
        inv.apply_transition(to, now);
    }

    assert_eq!(inv.status(), InvoiceStatus::Paid);
    assert_eq!(inv.sent_at, Some(now));
    assert_eq!(inv.viewed_at, Some(now));
    assert_eq!(inv.paid_at, Some(now));
}

#[test]
fn pending_invoice_can_be_sent_or_viewed() {
    assert!(InvoiceStatus::can_transition(
        InvoiceStatus::Pending,
        InvoiceStatus::Sent
    ));
    assert!(InvoiceStatus::can_transition(
        InvoiceStatus::Pending,
        InvoiceStatus::Viewed
    ));
}

#[test]
fn viewed_cannot_go_back_to_sent() {
    assert!(!InvoiceStatus::can_transition(
        InvoiceStatus::Viewed,
        InvoiceStatus::Sent
    ));
}

#[test]
fn nothing_transitions_out_of_paid() {
    for to in [
        InvoiceStatus::Draft,
        InvoiceStatus::Pending,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
        InvoiceStatus::Refunded,
    ] {
        assert!(
            !InvoiceStatus::can_transition(InvoiceStatus::Paid, to),
            "paid -> {} must be rejected",
            to.as_str()
        );
    }
}

#[test]
fn overdue_cannot_be_set_by_command() {
    for from in [
        InvoiceStatus::Draft,
        InvoiceStatus::Pending,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
    ] {
        assert!(!InvoiceStatus::can_transition(from, InvoiceStatus::Overdue));
    }
}

#[test]
fn overdue_invoice_can_still_be_paid() {
    let mut inv = invoice(InvoiceStatus::Sent, date(2025, 3, 10));
    let today = date(2025, 4, 1);
    assert_eq!(inv.derived_status(today), InvoiceStatus::Overdue);

    let now = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
    assert!(InvoiceStatus::can_transition(
        inv.derived_status(today),
        InvoiceStatus::Paid
    ));
    inv.apply_transition(InvoiceStatus::Paid, now);

    assert_eq!(inv.status(), InvoiceStatus::Paid);
    // Paid is terminal: the overdue derivation no longer applies.
    assert_eq!(inv.derived_status(date(2025, 6, 1)), InvoiceStatus::Paid);
}

#[test]
fn due_today_is_not_overdue() {
    let inv = invoice(InvoiceStatus::Sent, date(2025, 3, 10));
    assert_eq!(inv.derived_status(date(2025, 3, 10)), InvoiceStatus::Sent);
    assert_eq!(inv.derived_status(date(2025, 3, 11)), InvoiceStatus::Overdue);
}

#[test]
fn apply_derived_persists_the_overdue_flip() {
    let mut inv = invoice(InvoiceStatus::Sent, date(2025, 3, 10));
    inv.apply_derived(date(2025, 3, 20));
    assert_eq!(inv.status, "overdue");
}

#[test]
fn extending_the_due_date_clears_a_persisted_overdue() {
    // An overdue flip was written to storage, then the due date was
    // pushed out. The invoice must not stay overdue forever.
    let mut inv = invoice(InvoiceStatus::Sent, date(2025, 3, 10));
    inv.apply_derived(date(2025, 3, 20));
    assert_eq!(inv.status, "overdue");

    inv.due_date = date(2025, 4, 30);
    assert_eq!(inv.derived_status(date(2025, 3, 21)), InvoiceStatus::Sent);

    // And it is commandable again from that state.
    assert!(InvoiceStatus::can_transition(
        inv.derived_status(date(2025, 3, 21)),
        InvoiceStatus::Paid
    ));
}

#[test]
fn unknown_stored_status_reads_as_draft() {
    let mut inv = invoice(InvoiceStatus::Draft, date(2025, 3, 31));
    inv.status = "garbage".to_string();
    assert_eq!(inv.status(), InvoiceStatus::Draft);
}
