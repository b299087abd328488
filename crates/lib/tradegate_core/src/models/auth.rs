//! Identity domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! shapes in `tradegate_api::models`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to users provisioned without an explicit role.
pub const DEFAULT_ROLE: &str = "user";

/// License type given to tenants created on first federated sign-in.
pub const TRIAL_LICENSE: &str = "trial";

/// Verified identity attached to an authenticated request.
///
/// Built from access-token claims and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub tenant_id: String,
    pub role: String,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            tenant_id: user.tenant_id.clone(),
            role: user.role.clone(),
        }
    }
}

/// Domain user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub tenant_id: String,
    pub role: String,
    pub is_active: bool,
    /// Subject id at the federated identity provider, when linked.
    pub azure_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// User with password hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Fields needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub tenant_id: String,
    pub role: String,
    pub is_active: bool,
    pub azure_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
}

/// Customer organization ("company") owning users and data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Email domain the tenant is keyed by. Unique.
    pub domain: String,
    pub license_type: String,
    pub license_expires_at: DateTime<Utc>,
    pub max_users: i32,
}

/// Fields needed to create a tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub domain: String,
    pub license_type: String,
    pub license_expires_at: DateTime<Utc>,
    pub max_users: i32,
}

/// Refresh token record stored in the credential store.
///
/// Only the SHA-256 digest of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    pub email: String,
    pub tenant_id: String,
    pub role: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

impl AccessClaims {
    pub fn principal(self) -> Principal {
        Principal {
            id: self.sub,
            email: self.email,
            tenant_id: self.tenant_id,
            role: self.role,
        }
    }
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    /// Random id so two tokens issued in the same second never collide.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}
