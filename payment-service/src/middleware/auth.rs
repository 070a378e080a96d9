//! Caller identity extractor.
//!
//! The mobile client's session layer authenticates the user and forwards
//! identity headers. Lifecycle operations still take tenant identifiers
//! as explicit parameters; the context here is only used for ownership
//! and role checks, never as ambient session state.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Role of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Tenant,
}

/// Identity extracted from request headers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    /// True when the caller is the given tenant, or a property owner.
    pub fn can_access_tenant(&self, tenant_id: Uuid) -> bool {
        match self.role {
            Role::Owner => true,
            Role::Tenant => self.user_id == tenant_id,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header")))?;

        let role = parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-Role header")))?;
        let role = match role.to_ascii_lowercase().as_str() {
            "owner" => Role::Owner,
            "tenant" => Role::Tenant,
            other => {
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Unknown role: {other}"
                )))
            }
        };

        Ok(AuthContext { user_id, role })
    }
}
