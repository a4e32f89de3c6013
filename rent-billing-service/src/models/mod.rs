//! Domain models for rent-billing-service.

mod invoice;
mod lease;
mod line_item;

pub use invoice::{
    compute_totals, manual_invoice_number, Attachment, CreateInvoice, Invoice, InvoiceCategory,
    InvoicePriority, InvoiceStatus, ListInvoicesFilter, RecurrenceFrequency, UpdateInvoice,
};
pub use lease::{Lease, LeaseStatus, TenantRecord};
pub use line_item::{LineItem, NewLineItem};
