use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::CredentialError, metadata::CredentialMetadata, traits::CredentialResolver};

/// A `CredentialResolver` that treats every `credential_id` as accessible
/// without touching storage. Used for offline workflow validation (`cli
/// validate`), where there is no live tenant to resolve secrets against.
pub struct DryRunCredentialResolver;

#[async_trait]
impl CredentialResolver for DryRunCredentialResolver {
    async fn get_decrypted_secret(&self, _: Uuid, _: Uuid) -> Result<String, CredentialError> {
        Ok(String::new())
    }

    async fn validate(&self, _: Uuid, _: Uuid) -> Result<(), CredentialError> {
        Ok(())
    }

    async fn get_metadata(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<CredentialMetadata, CredentialError> {
        Ok(CredentialMetadata { credential_id, tenant_id, key: String::new(), accessible: true })
    }

    async fn refresh_if_needed(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<CredentialMetadata, CredentialError> {
        self.get_metadata(credential_id, tenant_id).await
    }
}
