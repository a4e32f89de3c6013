//! Invoice CRUD and status transition handlers.

use crate::handlers::org_context;
use crate::models::{
    Attachment, CreateInvoice, Invoice, InvoiceCategory, InvoicePriority, InvoiceStatus, LineItem,
    ListInvoicesFilter, NewLineItem, RecurrenceFrequency, UpdateInvoice,
};
use crate::services::metrics::INVOICES_TOTAL;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

// Serialize is required by the length validator on collections of these.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl LineItemRequest {
    fn into_domain(self, sort_order: i32) -> Result<NewLineItem, AppError> {
        if self.quantity < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line item quantity cannot be negative"
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line item unit price cannot be negative"
            )));
        }
        if self
            .tax_rate
            .is_some_and(|r| r < Decimal::ZERO || r > Decimal::ONE_HUNDRED)
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line item tax rate must be between 0 and 100"
            )));
        }
        Ok(NewLineItem {
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            tax_rate: self.tax_rate.unwrap_or(Decimal::ZERO),
            sort_order: self.sort_order.unwrap_or(sort_order),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    #[serde(default)]
    pub lease_id: Option<Uuid>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub title: Option<String>,
    pub category: String,
    #[serde(default)]
    pub priority: Option<String>,
    /// Defaults to the creation date when omitted.
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub next_invoice_date: Option<NaiveDate>,
    #[serde(default)]
    pub recurrence_end_date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRequest>,
    #[validate(length(min = 1, message = "at least one line item is required"))]
    #[validate(nested)]
    pub line_items: Vec<LineItemRequest>,
}

impl CreateInvoiceRequest {
    /// Semantic checks that the derive-level validation cannot express:
    /// date ordering, sign constraints, and enum parsing.
    pub fn into_domain(
        self,
        org_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CreateInvoice, AppError> {
        let issue_date = self.issue_date.unwrap_or_else(|| now.date_naive());
        if self.due_date < issue_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Due date cannot be before issue date"
            )));
        }

        let category = InvoiceCategory::parse(&self.category)
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown category '{}'", self.category)))?;
        let priority = match &self.priority {
            Some(p) => InvoicePriority::parse(p)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown priority '{}'", p)))?,
            None => InvoicePriority::Medium,
        };
        let frequency = match &self.frequency {
            Some(f) => Some(
                RecurrenceFrequency::parse(f)
                    .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown frequency '{}'", f)))?,
            ),
            None => None,
        };
        if self.is_recurring && frequency.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Recurring invoices require a frequency"
            )));
        }
        if self
            .next_invoice_date
            .is_some_and(|next| next <= issue_date)
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Next invoice date must be after the issue date"
            )));
        }
        if let (Some(next), Some(end)) = (self.next_invoice_date, self.recurrence_end_date) {
            if end <= next {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Recurrence end date must be after the next invoice date"
                )));
            }
        }

        let tax_amount = self.tax_amount.unwrap_or(Decimal::ZERO);
        let discount_amount = self.discount_amount.unwrap_or(Decimal::ZERO);
        if tax_amount < Decimal::ZERO || discount_amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Tax and discount amounts cannot be negative"
            )));
        }

        let mut line_items = Vec::with_capacity(self.line_items.len());
        for (i, item) in self.line_items.into_iter().enumerate() {
            line_items.push(item.into_domain(i as i32)?);
        }

        let attachments = self
            .attachments
            .into_iter()
            .map(|a| Attachment {
                url: a.url,
                filename: a.filename,
                description: a.description,
                uploaded_utc: now,
            })
            .collect();

        Ok(CreateInvoice {
            org_id,
            tenant_id: self.tenant_id,
            property_id: self.property_id,
            lease_id: self.lease_id,
            created_by: self.created_by,
            title: self.title,
            category,
            priority,
            issue_date,
            due_date: self.due_date,
            tax_amount,
            discount_amount,
            is_recurring: self.is_recurring,
            frequency,
            next_invoice_date: self.next_invoice_date,
            recurrence_end_date: self.recurrence_end_date,
            notes: self.notes,
            payment_terms: self.payment_terms,
            attachments,
            line_items,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub property_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub line_items: Option<Vec<LineItemRequest>>,
}

impl UpdateInvoiceRequest {
    pub fn into_domain(self) -> Result<UpdateInvoice, AppError> {
        let category = match &self.category {
            Some(c) => Some(
                InvoiceCategory::parse(c)
                    .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown category '{}'", c)))?,
            ),
            None => None,
        };
        let priority = match &self.priority {
            Some(p) => Some(
                InvoicePriority::parse(p)
                    .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown priority '{}'", p)))?,
            ),
            None => None,
        };
        if self.tax_amount.is_some_and(|t| t < Decimal::ZERO)
            || self.discount_amount.is_some_and(|d| d < Decimal::ZERO)
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Tax and discount amounts cannot be negative"
            )));
        }
        if self
            .line_items
            .as_ref()
            .is_some_and(|items| items.is_empty())
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one line item is required"
            )));
        }

        let line_items = match self.line_items {
            Some(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(item.into_domain(i as i32)?);
                }
                Some(out)
            }
            None => None,
        };

        Ok(UpdateInvoice {
            tenant_id: self.tenant_id,
            property_id: self.property_id,
            title: self.title,
            category,
            priority,
            due_date: self.due_date,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            notes: self.notes,
            payment_terms: self.payment_terms,
            line_items,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub lease_id: Option<Uuid>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub page_size: Option<i32>,
    #[serde(default)]
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemResponse {
    pub line_item_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
}

impl From<LineItem> for LineItemResponse {
    fn from(li: LineItem) -> Self {
        Self {
            line_item_id: li.line_item_id,
            description: li.description,
            quantity: li.quantity,
            unit_price: li.unit_price,
            tax_rate: li.tax_rate,
            amount: li.amount,
            sort_order: li.sort_order,
        }
    }
}

/// Invoice as readers see it: `status` is the derived status as of today,
/// not necessarily the stored column.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub lease_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub title: Option<String>,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub frequency: Option<String>,
    pub next_invoice_date: Option<NaiveDate>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
    pub attachments: Vec<Attachment>,
    pub line_items: Vec<LineItemResponse>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl InvoiceResponse {
    pub fn from_record(invoice: Invoice, line_items: Vec<LineItem>, today: NaiveDate) -> Self {
        let status = invoice.derived_status(today).as_str().to_string();
        Self {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
            tenant_id: invoice.tenant_id,
            property_id: invoice.property_id,
            lease_id: invoice.lease_id,
            created_by: invoice.created_by,
            title: invoice.title,
            category: invoice.category,
            priority: invoice.priority,
            status,
            subtotal: invoice.subtotal,
            tax_amount: invoice.tax_amount,
            discount_amount: invoice.discount_amount,
            total_amount: invoice.total_amount,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            sent_at: invoice.sent_at,
            viewed_at: invoice.viewed_at,
            paid_at: invoice.paid_at,
            is_recurring: invoice.is_recurring,
            frequency: invoice.frequency,
            next_invoice_date: invoice.next_invoice_date,
            recurrence_end_date: invoice.recurrence_end_date,
            notes: invoice.notes,
            payment_terms: invoice.payment_terms,
            attachments: invoice.attachments.0,
            line_items: line_items.into_iter().map(Into::into).collect(),
            created_utc: invoice.created_utc,
            updated_utc: invoice.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesResponse {
    pub invoices: Vec<InvoiceResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

/// POST /invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    let ctx = org_context(&headers)?;
    payload.validate()?;

    let now = Utc::now();
    let input = payload.into_domain(ctx.org_id, now)?;

    state
        .db
        .verify_tenant_reference(ctx.org_id, input.tenant_id, input.property_id)
        .await?;

    let (invoice, line_items) = state.db.create_invoice(&input, now).await?;
    INVOICES_TOTAL.with_label_values(&[&invoice.status]).inc();

    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::from_record(
            invoice,
            line_items,
            now.date_naive(),
        )),
    ))
}

/// GET /invoices/{id}
pub async fn get_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let ctx = org_context(&headers)?;

    let invoice = state
        .db
        .get_invoice(ctx.org_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    let line_items = state.db.get_line_items(ctx.org_id, invoice_id).await?;

    Ok(Json(InvoiceResponse::from_record(
        invoice,
        line_items,
        Utc::now().date_naive(),
    )))
}

/// GET /invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<ListInvoicesResponse>, AppError> {
    let ctx = org_context(&headers)?;

    let status = match &query.status {
        Some(s) => Some(
            InvoiceStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown status '{}'", s)))?,
        ),
        None => None,
    };
    let category = match &query.category {
        Some(c) => Some(
            InvoiceCategory::parse(c)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown category '{}'", c)))?,
        ),
        None => None,
    };

    let page_size = query.page_size.unwrap_or(50).clamp(1, 100);
    let filter = ListInvoicesFilter {
        status,
        category,
        tenant_id: query.tenant_id,
        lease_id: query.lease_id,
        start_date: query.start_date,
        end_date: query.end_date,
        page_size,
        page_token: query.page_token,
    };

    let invoices = state.db.list_invoices(ctx.org_id, &filter).await?;
    let today = Utc::now().date_naive();

    let next_page_token = if invoices.len() as i32 == page_size {
        invoices.last().map(|inv| inv.invoice_id)
    } else {
        None
    };

    let invoices = invoices
        .into_iter()
        .map(|inv| InvoiceResponse::from_record(inv, Vec::new(), today))
        .collect();

    Ok(Json(ListInvoicesResponse {
        invoices,
        next_page_token,
    }))
}

/// PUT /invoices/{id}
pub async fn update_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let ctx = org_context(&headers)?;
    payload.validate()?;

    let input = payload.into_domain()?;
    let now = Utc::now();

    let invoice = state
        .db
        .update_invoice(ctx.org_id, invoice_id, &input, now)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    let line_items = state.db.get_line_items(ctx.org_id, invoice_id).await?;

    Ok(Json(InvoiceResponse::from_record(
        invoice,
        line_items,
        now.date_naive(),
    )))
}

/// DELETE /invoices/{id}
pub async fn delete_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let ctx = org_context(&headers)?;
    ctx.require_manager()?;

    let deleted = state.db.delete_invoice(ctx.org_id, invoice_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /invoices/{id}/status
pub async fn change_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let ctx = org_context(&headers)?;

    let to = InvoiceStatus::parse(&payload.status).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown status '{}'", payload.status))
    })?;

    let now = Utc::now();
    let invoice = state
        .db
        .update_status(ctx.org_id, invoice_id, to, now)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    INVOICES_TOTAL.with_label_values(&[&invoice.status]).inc();

    let line_items = state.db.get_line_items(ctx.org_id, invoice_id).await?;

    Ok(Json(InvoiceResponse::from_record(
        invoice,
        line_items,
        now.date_naive(),
    )))
}
