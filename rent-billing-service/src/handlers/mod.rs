//! HTTP handlers.
//!
//! Every billing route runs inside an org context taken from the `x-org-id`
//! header (populated by the gateway after authentication). A request without
//! it is unauthenticated; handlers never fall back to a default org.

use axum::http::HeaderMap;
use service_core::error::AppError;
use uuid::Uuid;

pub mod bulk;
pub mod generation;
pub mod invoices;
pub mod summary;

pub const ORG_ID_HEADER: &str = "x-org-id";
pub const ROLE_HEADER: &str = "x-role";

/// Identity attached to a request by the gateway.
#[derive(Debug, Clone)]
pub struct OrgContext {
    pub org_id: Uuid,
    pub role: Option<String>,
}

/// Extract the org context, rejecting requests with no resolvable org.
pub fn org_context(headers: &HeaderMap) -> Result<OrgContext, AppError> {
    let org_id = headers
        .get(ORG_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid organization context"))
        })?;

    let role = headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(OrgContext { org_id, role })
}

impl OrgContext {
    /// Destructive and batch operations require an elevated role. Requests
    /// without a role header are trusted service-to-service calls.
    pub fn require_manager(&self) -> Result<(), AppError> {
        match self.role.as_deref() {
            None | Some("admin") | Some("manager") => Ok(()),
            Some(other) => Err(AppError::Forbidden(anyhow::anyhow!(
                "Role '{}' may not perform this operation",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_org_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(
            org_context(&headers),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn malformed_org_header_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(ORG_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            org_context(&headers),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn tenant_role_cannot_perform_manager_operations() {
        let ctx = OrgContext {
            org_id: Uuid::new_v4(),
            role: Some("tenant".to_string()),
        };
        assert!(matches!(ctx.require_manager(), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn absent_role_is_trusted() {
        let ctx = OrgContext {
            org_id: Uuid::new_v4(),
            role: None,
        };
        assert!(ctx.require_manager().is_ok());
    }
}
