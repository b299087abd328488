//! In-memory credential store for tests and local development.
//!
//! All state sits behind one `RwLock`, so every trait operation is a single
//! critical section: revoke-all cannot interleave with a refresh lookup, and
//! lookup-or-insert is atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CredentialStore, StoreError};
use crate::models::auth::{NewTenant, NewUser, RefreshTokenRecord, Tenant, User, UserWithPassword};

#[derive(Default)]
struct Inner {
    /// Keyed by user ID.
    users: HashMap<String, UserWithPassword>,
    /// Email → user ID.
    emails: HashMap<String, String>,
    /// Keyed by domain.
    tenants: HashMap<String, Tenant>,
    /// Keyed by token hash.
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// Credential store held entirely in process memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Inner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable a user account.
    pub async fn set_active(&self, user_id: &str, active: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        stored.user.is_active = active;
        Ok(())
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn tenant_count(&self) -> usize {
        self.inner.read().await.tenants.len()
    }

    pub async fn refresh_token_count(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .await
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .emails
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user_id).map(|stored| stored.user.clone()))
    }

    async fn create_user_if_absent(&self, new_user: NewUser) -> Result<(User, bool), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .emails
            .get(&new_user.email)
            .and_then(|id| inner.users.get(id))
        {
            return Ok((existing.user.clone(), false));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: new_user.email,
            tenant_id: new_user.tenant_id,
            role: new_user.role,
            is_active: new_user.is_active,
            azure_id: new_user.azure_id,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            last_login_at: Some(Utc::now()),
        };
        inner.emails.insert(user.email.clone(), user.id.clone());
        inner.users.insert(
            user.id.clone(),
            UserWithPassword {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        Ok((user, true))
    }

    async fn record_login(
        &self,
        user_id: &str,
        azure_id: Option<&str>,
    ) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        stored.user.last_login_at = Some(Utc::now());
        if stored.user.azure_id.is_none() {
            stored.user.azure_id = azure_id.map(str::to_string);
        }
        Ok(stored.user.clone())
    }

    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self.inner.read().await.tenants.get(domain).cloned())
    }

    async fn find_or_create_tenant(&self, new_tenant: NewTenant) -> Result<Tenant, StoreError> {
        let mut inner = self.inner.write().await;
        let tenant = inner
            .tenants
            .entry(new_tenant.domain.clone())
            .or_insert_with(|| Tenant {
                id: uuid::Uuid::new_v4().to_string(),
                name: new_tenant.name,
                domain: new_tenant.domain,
                license_type: new_tenant.license_type,
                license_expires_at: new_tenant.license_expires_at,
                max_users: new_tenant.max_users,
            });
        Ok(tenant.clone())
    }

    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .refresh_tokens
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .refresh_tokens
            .get(token_hash)
            .cloned())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, r| r.user_id != user_id);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }
}
