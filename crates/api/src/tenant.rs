//! Tenant resolution for the HTTP surface.
//!
//! Every tenant-scoped route requires an `X-Tenant-Id` header carrying the
//! caller's tenant UUID. Real deployments would derive this from an
//! authenticated session; that's an external collaborator this core does
//! not own.

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use uuid::Uuid;

pub struct TenantId(pub Uuid);

impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("X-Tenant-Id")
            .ok_or(StatusCode::BAD_REQUEST)?;
        let value = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;
        let id = Uuid::parse_str(value).map_err(|_| StatusCode::BAD_REQUEST)?;
        Ok(TenantId(id))
    }
}
