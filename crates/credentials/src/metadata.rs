use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Non-secret facts about a credential: enough for a UI or the engine's
/// validation pass to reason about it without ever touching the decrypted
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub credential_id: Uuid,
    pub tenant_id: Uuid,
    pub key: String,
    pub accessible: bool,
}
