//! Read-only collaborator rows: leases and the tenants they bill.
//!
//! The tenant/property/lease stores themselves are owned elsewhere; the
//! engine only reads them for recurring generation and reference checks.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lease status. Only active leases are eligible for recurring billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Active,
    Ended,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Active => "active",
            LeaseStatus::Ended => "ended",
        }
    }
}

/// Lease contract.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lease {
    pub lease_id: Uuid,
    pub org_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub rent_amount: Decimal,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
}

/// Tenant (renter) lookup row, used for cross-entity reference checks:
/// the tenant's org and property must match the invoice's.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantRecord {
    pub tenant_id: Uuid,
    pub org_id: Uuid,
    pub property_id: Uuid,
    pub full_name: String,
    pub created_utc: DateTime<Utc>,
}
