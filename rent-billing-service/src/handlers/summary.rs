//! Summary report endpoint.

use crate::handlers::org_context;
use crate::services::summary::{compute_summary, InvoiceSummary};
use crate::startup::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use service_core::error::AppError;

/// GET /invoices/summary
pub async fn invoice_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InvoiceSummary>, AppError> {
    let ctx = org_context(&headers)?;

    let invoices = state.db.list_invoices_for_summary(ctx.org_id).await?;
    let summary = compute_summary(&invoices, Utc::now().date_naive());

    Ok(Json(summary))
}
