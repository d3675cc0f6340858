use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::CredentialError, metadata::CredentialMetadata};

/// Tenant-scoped credential lookup. Implementations own decrypt and
/// accessibility checks; the engine only ever sees the result of
/// `get_decrypted_secret`, and only for the duration of one adapter call.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn get_decrypted_secret(
        &self,
        credential_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<String, CredentialError>;

    async fn validate(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<(), CredentialError>;

    async fn get_metadata(
        &self,
        credential_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CredentialMetadata, CredentialError>;

    /// No-op for static secrets; a resolver backing OAuth-style credentials
    /// would refresh an expiring token here. Returns the (possibly
    /// refreshed) metadata.
    async fn refresh_if_needed(
        &self,
        credential_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CredentialMetadata, CredentialError>;
}
