//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialStore, StoreError};
use crate::models::auth::{NewTenant, NewUser, RefreshTokenRecord, Tenant, User, UserWithPassword};
use crate::uuid::uuidv7;

const USER_COLUMNS: &str = "id::text, email, company_id::text, role, is_active, azure_id, \
     first_name, last_name, last_login_at, password_hash";

const TENANT_COLUMNS: &str = "id::text, name, domain, license_type, license_expires_at, max_users";

type UserRow = (
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<String>,
);

type TenantRow = (String, String, String, String, DateTime<Utc>, i32);

fn user_from_row(row: UserRow) -> UserWithPassword {
    let (id, email, tenant_id, role, is_active, azure_id, first_name, last_name, last_login_at, password_hash) =
        row;
    UserWithPassword {
        user: User {
            id,
            email,
            tenant_id,
            role,
            is_active,
            azure_id,
            first_name,
            last_name,
            last_login_at,
        },
        password_hash,
    }
}

fn tenant_from_row(row: TenantRow) -> Tenant {
    let (id, name, domain, license_type, license_expires_at, max_users) = row;
    Tenant {
        id,
        name,
        domain,
        license_type,
        license_expires_at,
        max_users,
    }
}

/// Credential store backed by the `users`, `companies` and `refresh_tokens` tables.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1::uuid"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| user_from_row(r).user))
    }

    async fn create_user_if_absent(&self, new_user: NewUser) -> Result<(User, bool), StoreError> {
        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users \
               (email, company_id, role, is_active, azure_id, first_name, last_name, password_hash, last_login_at) \
             VALUES ($1, $2::uuid, $3, $4, $5, $6, $7, $8, now()) \
             ON CONFLICT (email) DO NOTHING \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.email)
        .bind(&new_user.tenant_id)
        .bind(&new_user.role)
        .bind(new_user.is_active)
        .bind(&new_user.azure_id)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((user_from_row(row).user, true));
        }

        // Lost the race to a concurrent insert for the same email.
        let existing = self
            .find_user_by_email(&new_user.email)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", new_user.email)))?;
        Ok((existing.user, false))
    }

    async fn record_login(
        &self,
        user_id: &str,
        azure_id: Option<&str>,
    ) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users \
             SET last_login_at = now(), azure_id = COALESCE(azure_id, $2) \
             WHERE id = $1::uuid \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(azure_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        Ok(user_from_row(row).user)
    }

    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM companies WHERE domain = $1"
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(tenant_from_row))
    }

    async fn find_or_create_tenant(&self, new_tenant: NewTenant) -> Result<Tenant, StoreError> {
        let inserted = sqlx::query_as::<_, TenantRow>(&format!(
            "INSERT INTO companies (name, domain, license_type, license_expires_at, max_users) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (domain) DO NOTHING \
             RETURNING {TENANT_COLUMNS}"
        ))
        .bind(&new_tenant.name)
        .bind(&new_tenant.domain)
        .bind(&new_tenant.license_type)
        .bind(new_tenant.license_expires_at)
        .bind(new_tenant.max_users)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(tenant_from_row(row)),
            None => self
                .find_tenant_by_domain(&new_tenant.domain)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("company {}", new_tenant.domain))),
        }
    }

    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at) \
             VALUES ($1, $2, $3::uuid, $4)",
        )
        .bind(uuidv7())
        .bind(&record.token_hash)
        .bind(&record.user_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
            "SELECT token_hash, user_id::text, expires_at FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(token_hash, user_id, expires_at)| RefreshTokenRecord {
            token_hash,
            user_id,
            expires_at,
        }))
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1::uuid")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
