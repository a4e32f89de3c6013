//! Recurring generation endpoint.

use crate::handlers::org_context;
use crate::services::generation::{run_generation, GenerationOutcome};
use crate::startup::AppState;
use axum::{extract::State, http::{HeaderMap, StatusCode}, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Any day within the target month. Defaults to the next calendar month.
    #[serde(default)]
    pub for_month: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub count: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl From<GenerationOutcome> for GenerateResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            count: outcome.created,
            skipped: outcome.skipped,
            errors: outcome.errors,
        }
    }
}

/// POST /invoices/generate
pub async fn generate_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<GenerateRequest>>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    let ctx = org_context(&headers)?;
    ctx.require_manager()?;

    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let policy = state.config.generation.missing_reference_policy;

    let outcome = run_generation(
        &state.db,
        ctx.org_id,
        request.for_month,
        policy,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}
