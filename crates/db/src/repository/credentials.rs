//! Secret storage — tenant-scoped key/value rows. Decryption and
//! allowlisting live in the `credentials` crate; this module is pure
//! storage.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::SecretRow, DbError};

pub async fn put_secret(
    pool: &PgPool,
    tenant_id: Uuid,
    key: &str,
    encrypted_value: &str,
) -> Result<SecretRow, DbError> {
    let id = Uuid::new_v4();

    let row = sqlx::query_as!(
        SecretRow,
        r#"
        INSERT INTO secrets (id, tenant_id, key, encrypted_value)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (tenant_id, key) DO UPDATE SET encrypted_value = EXCLUDED.encrypted_value
        RETURNING id, tenant_id, key, encrypted_value
        "#,
        id,
        tenant_id,
        key,
        encrypted_value,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_secret(pool: &PgPool, tenant_id: Uuid, key: &str) -> Result<SecretRow, DbError> {
    let row = sqlx::query_as!(
        SecretRow,
        r#"
        SELECT id, tenant_id, key, encrypted_value
        FROM secrets
        WHERE tenant_id = $1 AND key = $2
        "#,
        tenant_id,
        key,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

pub async fn get_secret_by_id(
    pool: &PgPool,
    tenant_id: Uuid,
    credential_id: Uuid,
) -> Result<SecretRow, DbError> {
    let row = sqlx::query_as!(
        SecretRow,
        r#"
        SELECT id, tenant_id, key, encrypted_value
        FROM secrets
        WHERE tenant_id = $1 AND id = $2
        "#,
        tenant_id,
        credential_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

pub async fn list_secret_keys(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query!("SELECT key FROM secrets WHERE tenant_id = $1", tenant_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|r| r.key).collect())
}

pub async fn delete_secret(pool: &PgPool, tenant_id: Uuid, key: &str) -> Result<(), DbError> {
    let result = sqlx::query!(
        "DELETE FROM secrets WHERE tenant_id = $1 AND key = $2",
        tenant_id,
        key,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
