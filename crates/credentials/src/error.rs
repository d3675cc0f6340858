use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential {credential_id} not found for tenant {tenant_id}")]
    NotFound {
        credential_id: Uuid,
        tenant_id: Uuid,
    },

    #[error("credential {credential_id} is not accessible to tenant {tenant_id}")]
    NotAccessible {
        credential_id: Uuid,
        tenant_id: Uuid,
    },

    #[error("failed to decode secret material: {0}")]
    Decode(String),

    #[error(transparent)]
    Db(#[from] db::DbError),
}
