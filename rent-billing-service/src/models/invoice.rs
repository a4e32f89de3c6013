//! Invoice model: the persisted record, its status machine, and the
//! derived-field rules that must hold after every mutation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::NewLineItem;

/// Invoice billing category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceCategory {
    Rent,
    Utilities,
    Maintenance,
    LateFee,
    SecurityDeposit,
    Other,
}

impl InvoiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceCategory::Rent => "rent",
            InvoiceCategory::Utilities => "utilities",
            InvoiceCategory::Maintenance => "maintenance",
            InvoiceCategory::LateFee => "late_fee",
            InvoiceCategory::SecurityDeposit => "security_deposit",
            InvoiceCategory::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        Self::parse(s).unwrap_or(InvoiceCategory::Other)
    }

    /// Strict parse for request input; `from_string` stays lossy for rows.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rent" => Some(InvoiceCategory::Rent),
            "utilities" => Some(InvoiceCategory::Utilities),
            "maintenance" => Some(InvoiceCategory::Maintenance),
            "late_fee" => Some(InvoiceCategory::LateFee),
            "security_deposit" => Some(InvoiceCategory::SecurityDeposit),
            "other" => Some(InvoiceCategory::Other),
            _ => None,
        }
    }
}

/// Invoice priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoicePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl InvoicePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoicePriority::Low => "low",
            InvoicePriority::Medium => "medium",
            InvoicePriority::High => "high",
            InvoicePriority::Urgent => "urgent",
        }
    }

    pub fn from_string(s: &str) -> Self {
        Self::parse(s).unwrap_or(InvoicePriority::Medium)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(InvoicePriority::Low),
            "medium" => Some(InvoicePriority::Medium),
            "high" => Some(InvoicePriority::High),
            "urgent" => Some(InvoicePriority::Urgent),
            _ => None,
        }
    }
}

/// Invoice status.
///
/// `pending` is the billing state of recurring-generated invoices; `overdue`
/// is derived from the due date, never set by an explicit command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Sent,
    Viewed,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        Self::parse(s).unwrap_or(InvoiceStatus::Draft)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "pending" => Some(InvoiceStatus::Pending),
            "sent" => Some(InvoiceStatus::Sent),
            "viewed" => Some(InvoiceStatus::Viewed),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            "refunded" => Some(InvoiceStatus::Refunded),
            _ => None,
        }
    }

    /// Terminal states never auto-transition to overdue and accept no
    /// further commands.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Refunded
        )
    }

    /// Compute the status a reader should see: any non-terminal invoice
    /// past its due date reports `overdue`, regardless of what storage
    /// holds. Lazy, clock-injected; there is no scheduled transition.
    pub fn derived(stored: InvoiceStatus, due_date: NaiveDate, today: NaiveDate) -> InvoiceStatus {
        if stored.is_terminal() {
            return stored;
        }
        if today > due_date {
            return InvoiceStatus::Overdue;
        }
        if stored == InvoiceStatus::Overdue {
            // A persisted overdue whose due date was later extended. Sent
            // is the live state overdue invoices are acted on from.
            return InvoiceStatus::Sent;
        }
        stored
    }

    /// Whether an explicit command may move `from` to `to`. `overdue` is
    /// excluded here because it is derived, not commanded.
    pub fn can_transition(from: InvoiceStatus, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        if from.is_terminal() {
            return false;
        }
        match to {
            Sent => matches!(from, Draft | Pending),
            Viewed => matches!(from, Pending | Sent | Overdue),
            Paid => true,
            Cancelled | Refunded => true,
            Draft | Pending | Overdue => false,
        }
    }
}

/// Recurrence frequency for recurring invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurrenceFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceFrequency::Monthly => "monthly",
            RecurrenceFrequency::Quarterly => "quarterly",
            RecurrenceFrequency::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(RecurrenceFrequency::Monthly),
            "quarterly" => Some(RecurrenceFrequency::Quarterly),
            "yearly" => Some(RecurrenceFrequency::Yearly),
            _ => None,
        }
    }
}

/// Attachment reference stored on the invoice. Serialized camelCase both
/// in the JSONB column and on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
    pub uploaded_utc: DateTime<Utc>,
}

/// Invoice record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub org_id: Uuid,
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
    pub attachments: sqlx::types::Json<Vec<Attachment>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    /// The status a caller should observe as of `today`.
    pub fn derived_status(&self, today: NaiveDate) -> InvoiceStatus {
        InvoiceStatus::derived(self.status(), self.due_date, today)
    }

    /// Rewrite the stored status with the derived one. Saves call this so
    /// raw-storage readers see a best-effort value; correctness still comes
    /// from deriving on read.
    pub fn apply_derived(&mut self, today: NaiveDate) {
        self.status = self.derived_status(today).as_str().to_string();
    }

    /// Move the invoice to `to`, stamping `sent_at`/`viewed_at`/`paid_at`
    /// on first entry only. Existing timestamps are never overwritten.
    pub fn apply_transition(&mut self, to: InvoiceStatus, now: DateTime<Utc>) {
        match to {
            InvoiceStatus::Sent if self.sent_at.is_none() => self.sent_at = Some(now),
            InvoiceStatus::Viewed if self.viewed_at.is_none() => self.viewed_at = Some(now),
            InvoiceStatus::Paid if self.paid_at.is_none() => self.paid_at = Some(now),
            _ => {}
        }
        self.status = to.as_str().to_string();
        self.updated_utc = now;
    }
}

/// `total = subtotal + tax − discount`, recomputed unconditionally on every
/// save so stored financials can never drift from the line items.
pub fn compute_totals(
    line_amounts: &[Decimal],
    tax_amount: Decimal,
    discount_amount: Decimal,
) -> (Decimal, Decimal) {
    let subtotal: Decimal = line_amounts.iter().copied().sum();
    (subtotal, subtotal + tax_amount - discount_amount)
}

/// Invoice number for manually created invoices:
/// `INV-<epoch millis>-<zero-padded per-org sequence>`. Uniqueness is
/// guaranteed by the `(org_id, invoice_number)` constraint, not this format.
pub fn manual_invoice_number(now: DateTime<Utc>, org_sequence: i64) -> String {
    format!("INV-{}-{:04}", now.timestamp_millis(), org_sequence)
}

/// Input for creating an invoice (already validated and id-resolved).
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub org_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub lease_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub title: Option<String>,
    pub category: InvoiceCategory,
    pub priority: InvoicePriority,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub is_recurring: bool,
    pub frequency: Option<RecurrenceFrequency>,
    pub next_invoice_date: Option<NaiveDate>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
    pub attachments: Vec<Attachment>,
    pub line_items: Vec<NewLineItem>,
}

/// Input for updating an invoice. `None` leaves the stored value alone;
/// totals are recomputed from the final line-item set either way.
#[derive(Debug, Clone, Default)]
pub struct UpdateInvoice {
    pub tenant_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub title: Option<String>,
    pub category: Option<InvoiceCategory>,
    pub priority: Option<InvoicePriority>,
    pub due_date: Option<NaiveDate>,
    pub tax_amount: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
    pub line_items: Option<Vec<NewLineItem>>,
}

impl UpdateInvoice {
    /// An update may not move the due date before the stored issue date.
    /// Checked before the write so the caller gets a validation error, not
    /// a surfaced CHECK-constraint failure.
    pub fn due_date_conflicts(&self, issue_date: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| due < issue_date)
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub category: Option<InvoiceCategory>,
    pub tenant_id: Option<Uuid>,
    pub lease_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}
