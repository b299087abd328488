//! Credential store: users, tenants and refresh tokens.
//!
//! The core consults the store through [`CredentialStore`] and never owns
//! the persistence. Creation operations are atomic lookup-or-insert so that
//! concurrent federated sign-ins for the same email or domain never produce
//! duplicates.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{NewTenant, NewUser, RefreshTokenRecord, Tenant, User, UserWithPassword};

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Persistence contract for identity records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a user (with password hash) by lower-cased email.
    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<UserWithPassword>, StoreError>;

    /// Fetch a user by ID.
    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Insert a user unless one with the same email exists.
    ///
    /// Returns the stored user and whether this call created it.
    async fn create_user_if_absent(&self, new_user: NewUser) -> Result<(User, bool), StoreError>;

    /// Stamp `last_login_at` and link the federated subject id if none is set yet.
    async fn record_login(&self, user_id: &str, azure_id: Option<&str>)
    -> Result<User, StoreError>;

    /// Fetch a tenant by its email domain.
    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError>;

    /// Return the tenant for `new_tenant.domain`, creating it if missing.
    async fn find_or_create_tenant(&self, new_tenant: NewTenant) -> Result<Tenant, StoreError>;

    /// Persist a refresh token record.
    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    /// Look up a refresh token by digest, regardless of expiry.
    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Delete every refresh token owned by a user. Returns the number removed.
    async fn delete_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, StoreError>;
}
