//! Tenant-scoped credential resolution.
//!
//! The engine resolves a `credentialId` exactly once per adapter call
//! (spec §4.6) and never persists the decrypted value — it lives in an
//! `AdapterContext` for the duration of one `execute()` and is dropped.

pub mod dry_run;
pub mod error;
pub mod in_memory;
pub mod metadata;
pub mod traits;

pub use dry_run::DryRunCredentialResolver;
pub use error::CredentialError;
pub use in_memory::InMemoryCredentialResolver;
pub use metadata::CredentialMetadata;
pub use traits::CredentialResolver;

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use uuid::Uuid;

    #[test]
    fn xor_roundtrip_matches_resolver_scheme() {
        let key = b"placeholder-key";
        let plain = b"super-secret-token";
        let cipher: Vec<u8> = plain
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % key.len()])
            .collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&cipher);

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        let roundtripped: Vec<u8> = decoded
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % key.len()])
            .collect();
        assert_eq!(roundtripped, plain);
    }

    #[test]
    fn not_found_error_carries_ids() {
        let credential_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let err = CredentialError::NotFound {
            credential_id,
            tenant_id,
        };
        let msg = err.to_string();
        assert!(msg.contains(&credential_id.to_string()));
        assert!(msg.contains(&tenant_id.to_string()));
    }
}
