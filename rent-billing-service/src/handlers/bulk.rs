//! Bulk status transitions.
//!
//! Resolution is all-or-nothing: if any requested id does not exist in the
//! caller's org, the whole batch is rejected and nothing is applied. Once
//! resolved, transitions apply per invoice, and an invalid transition lands
//! in the error list without stopping the rest.

use crate::handlers::org_context;
use crate::models::{Invoice, InvoiceStatus};
use crate::services::metrics::BULK_ACTIONS_TOTAL;
use crate::startup::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionData {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionRequest {
    pub action: String,
    #[validate(length(min = 1, max = 100))]
    pub invoice_ids: Vec<Uuid>,
    #[serde(default)]
    pub data: Option<BulkActionData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub invoice_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkError {
    pub invoice_id: Uuid,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionResponse {
    pub processed_count: u64,
    pub results: Vec<BulkResult>,
    pub errors: Vec<BulkError>,
}

/// Collapse duplicate ids to one application each, preserving order.
pub fn dedupe_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// All-or-nothing resolution: every requested id must resolve within the
/// caller's org, or the whole batch is rejected before anything applies.
pub fn ensure_all_resolved(requested: &[Uuid], found: &[Invoice]) -> Result<(), AppError> {
    if found.len() == requested.len() {
        return Ok(());
    }
    let found_ids: HashSet<Uuid> = found.iter().map(|inv| inv.invoice_id).collect();
    let missing: Vec<String> = requested
        .iter()
        .filter(|id| !found_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    Err(AppError::NotFound(anyhow::anyhow!(
        "Invoices not found: {}",
        missing.join(", ")
    )))
}

fn target_status(action: &str, data: Option<&BulkActionData>) -> Result<InvoiceStatus, AppError> {
    match action {
        "send_invoices" => Ok(InvoiceStatus::Sent),
        "mark_paid" => Ok(InvoiceStatus::Paid),
        "update_status" => {
            let status = data
                .and_then(|d| d.status.as_deref())
                .ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!("update_status requires data.status"))
                })?;
            InvoiceStatus::parse(status)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown status '{}'", status)))
        }
        other => Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown bulk action '{}'",
            other
        ))),
    }
}

/// POST /invoices/bulk
pub async fn bulk_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>, AppError> {
    let ctx = org_context(&headers)?;
    ctx.require_manager()?;
    payload.validate()?;

    let to = target_status(&payload.action, payload.data.as_ref())?;

    let ids = dedupe_ids(&payload.invoice_ids);
    let found = state.db.get_invoices_by_ids(ctx.org_id, &ids).await?;
    ensure_all_resolved(&ids, &found)?;

    // One timestamp for the whole batch so results are consistent.
    let now = Utc::now();
    let today = now.date_naive();

    let mut results = Vec::new();
    let mut errors = Vec::new();

    for invoice in &found {
        let from = invoice.derived_status(today);
        if !InvoiceStatus::can_transition(from, to) {
            errors.push(BulkError {
                invoice_id: invoice.invoice_id,
                error: format!(
                    "Cannot transition invoice from '{}' to '{}'",
                    from.as_str(),
                    to.as_str()
                ),
            });
            continue;
        }

        match state
            .db
            .update_status(ctx.org_id, invoice.invoice_id, to, now)
            .await
        {
            Ok(Some(updated)) => results.push(BulkResult {
                invoice_id: updated.invoice_id,
                status: updated.status,
            }),
            Ok(None) => errors.push(BulkError {
                invoice_id: invoice.invoice_id,
                error: "Invoice disappeared during the batch".to_string(),
            }),
            Err(AppError::BadRequest(reason)) => errors.push(BulkError {
                invoice_id: invoice.invoice_id,
                error: reason.to_string(),
            }),
            Err(e) => return Err(e),
        }
    }

    BULK_ACTIONS_TOTAL.with_label_values(&[&payload.action]).inc();

    Ok(Json(BulkActionResponse {
        processed_count: results.len() as u64,
        results,
        errors,
    }))
}
