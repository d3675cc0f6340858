use async_trait::async_trait;
use base64::Engine;
use db::DbPool;
use uuid::Uuid;

use crate::{error::CredentialError, metadata::CredentialMetadata, traits::CredentialResolver};

/// Reference `CredentialResolver` backed by `db::repository::credentials`.
///
/// "Decryption" is a placeholder XOR-over-a-fixed-key scheme behind
/// `encrypted_value`'s base64 encoding — encryption-at-rest is an external
/// collaborator this core does not own. Swap this resolver for a real vault
/// client without touching any caller; the trait is the only contract that
/// matters.
pub struct InMemoryCredentialResolver {
    pool: DbPool,
    xor_key: Vec<u8>,
}

impl InMemoryCredentialResolver {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            xor_key: b"placeholder-key".to_vec(),
        }
    }

    fn decode(&self, encrypted_value: &str) -> Result<String, CredentialError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encrypted_value)
            .map_err(|e| CredentialError::Decode(e.to_string()))?;
        let plain: Vec<u8> = bytes
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ self.xor_key[i % self.xor_key.len()])
            .collect();
        String::from_utf8(plain).map_err(|e| CredentialError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CredentialResolver for InMemoryCredentialResolver {
    async fn get_decrypted_secret(
        &self,
        credential_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<String, CredentialError> {
        let row = db::repository::credentials::get_secret_by_id(&self.pool, tenant_id, credential_id)
            .await
            .map_err(|e| match e {
                db::DbError::NotFound => CredentialError::NotFound {
                    credential_id,
                    tenant_id,
                },
                other => CredentialError::Db(other),
            })?;
        self.decode(&row.encrypted_value)
    }

    async fn validate(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<(), CredentialError> {
        db::repository::credentials::get_secret_by_id(&self.pool, tenant_id, credential_id)
            .await
            .map_err(|e| match e {
                db::DbError::NotFound => CredentialError::NotFound {
                    credential_id,
                    tenant_id,
                },
                other => CredentialError::Db(other),
            })?;
        Ok(())
    }

    async fn get_metadata(
        &self,
        credential_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CredentialMetadata, CredentialError> {
        let row = db::repository::credentials::get_secret_by_id(&self.pool, tenant_id, credential_id)
            .await
            .map_err(|e| match e {
                db::DbError::NotFound => CredentialError::NotFound {
                    credential_id,
                    tenant_id,
                },
                other => CredentialError::Db(other),
            })?;
        Ok(CredentialMetadata {
            credential_id: row.id,
            tenant_id: row.tenant_id,
            key: row.key,
            accessible: true,
        })
    }

    async fn refresh_if_needed(
        &self,
        credential_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CredentialMetadata, CredentialError> {
        self.get_metadata(credential_id, tenant_id).await
    }
}
