//! Request-to-domain conversion and the accounting identity.

use chrono::{NaiveDate, TimeZone, Utc};
use rent_billing_service::handlers::invoices::{
    CreateInvoiceRequest, LineItemRequest, UpdateInvoiceRequest,
};
use rent_billing_service::models::compute_totals;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn line(description: &str, quantity: i64, unit_price: &str) -> LineItemRequest {
    LineItemRequest {
        description: description.to_string(),
        quantity: Decimal::from(quantity),
        unit_price: unit_price.parse().unwrap(),
        tax_rate: None,
        sort_order: None,
    }
}

fn request() -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        tenant_id: Uuid::new_v4(),
        property_id: Uuid::new_v4(),
        lease_id: None,
        created_by: None,
        title: Some("March rent".to_string()),
        category: "rent".to_string(),
        priority: None,
        issue_date: Some(date(2025, 3, 1)),
        due_date: date(2025, 3, 31),
        tax_amount: None,
        discount_amount: None,
        is_recurring: false,
        frequency: None,
        next_invoice_date: None,
        recurrence_end_date: None,
        notes: None,
        payment_terms: None,
        attachments: Vec::new(),
        line_items: vec![line("Monthly rent", 1, "1000.00")],
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

#[test]
fn totals_recompute_from_line_items_tax_and_discount() {
    let mut req = request();
    req.tax_amount = Some("50".parse().unwrap());
    let input = req.into_domain(Uuid::new_v4(), now()).unwrap();

    let amounts: Vec<Decimal> = input.line_items.iter().map(|li| li.amount()).collect();
    let (subtotal, total) = compute_totals(&amounts, input.tax_amount, input.discount_amount);

    assert_eq!(subtotal, Decimal::from(1000));
    assert_eq!(total, Decimal::from(1050));
}

#[test]
fn due_before_issue_is_rejected() {
    let mut req = request();
    req.due_date = date(2025, 2, 15);
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn due_equal_to_issue_is_accepted() {
    let mut req = request();
    req.due_date = date(2025, 3, 1);
    assert!(req.into_domain(Uuid::new_v4(), now()).is_ok());
}

#[test]
fn omitted_issue_date_defaults_to_today() {
    // The wire shape requires no issue date at all.
    let body = serde_json::json!({
        "tenantId": Uuid::new_v4(),
        "propertyId": Uuid::new_v4(),
        "category": "rent",
        "dueDate": "2025-03-31",
        "lineItems": [{"description": "Monthly rent", "quantity": "1", "unitPrice": "1000.00"}]
    });
    let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();
    assert!(req.issue_date.is_none());

    let at = now();
    let input = req.into_domain(Uuid::new_v4(), at).unwrap();
    assert_eq!(input.issue_date, at.date_naive());
}

#[test]
fn omitted_issue_date_still_validates_due_date_ordering() {
    let mut req = request();
    req.issue_date = None;
    // now() is 2025-03-01; a due date before it must be rejected.
    req.due_date = date(2025, 2, 15);
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn unknown_category_is_rejected() {
    let mut req = request();
    req.category = "parking".to_string();
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn negative_quantity_line_item_is_rejected() {
    let mut req = request();
    req.line_items = vec![line("Monthly rent", -1, "1000.00")];
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));

    // Zero quantity is allowed; it just contributes nothing.
    let mut req = request();
    req.line_items = vec![line("Monthly rent", 0, "1000.00")];
    assert!(req.into_domain(Uuid::new_v4(), now()).is_ok());
}

#[test]
fn tax_rate_outside_0_to_100_is_rejected() {
    let mut req = request();
    let mut item = line("Monthly rent", 1, "1000.00");
    item.tax_rate = Some("101".parse().unwrap());
    req.line_items = vec![item];
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn recurrence_dates_must_be_ordered() {
    let mut req = request();
    req.is_recurring = true;
    req.frequency = Some("monthly".to_string());
    req.next_invoice_date = Some(date(2025, 4, 1));
    req.recurrence_end_date = Some(date(2025, 3, 15));
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));

    let mut req = request();
    req.is_recurring = true;
    req.frequency = Some("monthly".to_string());
    req.next_invoice_date = Some(date(2025, 4, 1));
    req.recurrence_end_date = Some(date(2025, 12, 31));
    assert!(req.into_domain(Uuid::new_v4(), now()).is_ok());
}

#[test]
fn negative_tax_is_rejected() {
    let mut req = request();
    req.tax_amount = Some("-5".parse().unwrap());
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn recurring_without_frequency_is_rejected() {
    let mut req = request();
    req.is_recurring = true;
    assert!(matches!(
        req.into_domain(Uuid::new_v4(), now()),
        Err(AppError::BadRequest(_))
    ));

    let mut req = request();
    req.is_recurring = true;
    req.frequency = Some("monthly".to_string());
    assert!(req.into_domain(Uuid::new_v4(), now()).is_ok());
}

#[test]
fn empty_line_items_fail_derive_validation() {
    let mut req = request();
    req.line_items = Vec::new();
    assert!(req.validate().is_err());
}

#[test]
fn caller_supplied_amounts_are_ignored() {
    // Amounts come from quantity * unit_price; there is no request field
    // for a line amount at all, and sort order defaults to position.
    let req = CreateInvoiceRequest {
        line_items: vec![line("A", 2, "10.00"), line("B", 1, "5.00")],
        ..request()
    };
    let input = req.into_domain(Uuid::new_v4(), now()).unwrap();

    assert_eq!(input.line_items[0].amount(), Decimal::from(20));
    assert_eq!(input.line_items[0].sort_order, 0);
    assert_eq!(input.line_items[1].sort_order, 1);
}

#[test]
fn attachments_are_stamped_with_upload_time() {
    let mut req = request();
    req.attachments = vec![rent_billing_service::handlers::invoices::AttachmentRequest {
        url: "https://files.example/march.pdf".to_string(),
        filename: "march.pdf".to_string(),
        description: None,
    }];
    let at = now();
    let input = req.into_domain(Uuid::new_v4(), at).unwrap();
    assert_eq!(input.attachments[0].uploaded_utc, at);
}

#[test]
fn update_with_empty_line_items_is_rejected() {
    let req = UpdateInvoiceRequest {
        tenant_id: None,
        property_id: None,
        title: None,
        category: None,
        priority: None,
        due_date: None,
        tax_amount: None,
        discount_amount: None,
        notes: None,
        payment_terms: None,
        line_items: Some(Vec::new()),
    };
    assert!(matches!(req.into_domain(), Err(AppError::BadRequest(_))));
}

#[test]
fn update_without_line_items_leaves_them_alone() {
    let req = UpdateInvoiceRequest {
        tenant_id: None,
        property_id: None,
        title: Some("Updated".to_string()),
        category: Some("late_fee".to_string()),
        priority: None,
        due_date: None,
        tax_amount: None,
        discount_amount: None,
        notes: None,
        payment_terms: None,
        line_items: None,
    };
    let input = req.into_domain().unwrap();
    assert!(input.line_items.is_none());
    assert_eq!(input.title.as_deref(), Some("Updated"));
}
