//! Token service: access token issue/verify, refresh token lifecycle.
//!
//! Access tokens are stateless JWTs: verification is a signature check plus
//! an expiry comparison, with no store access. Refresh tokens are JWTs too,
//! but are only honoured while their digest is present in the credential
//! store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::AuthError;
use super::jwt::SigningKeys;
use crate::models::auth::{AccessClaims, Principal, RefreshClaims, RefreshTokenRecord, User};
use crate::store::CredentialStore;

/// Default access token lifetime: 24 hours.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// A freshly issued refresh token.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Access + refresh token pair handed out at login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: i64,
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issues and verifies credentials.
///
/// Cheap to clone; keys are shared and read-only after construction.
#[derive(Clone)]
pub struct TokenService {
    keys: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    store: Arc<dyn CredentialStore>,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            keys: SigningKeys::from_secret(secret),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
            store,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Sign the principal's claims into an access token.
    pub fn issue_access_token(&self, principal: &Principal) -> Result<String, AuthError> {
        self.issue_access_token_at(principal, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: principal.id.clone(),
            email: principal.email.clone(),
            tenant_id: principal.tenant_id.clone(),
            role: principal.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        self.keys.sign(&claims)
    }

    /// Verify an access token and return the embedded principal.
    pub fn verify_access_token(&self, token: &str) -> Result<Principal, AuthError> {
        self.verify_access_token_at(token, Utc::now())
    }

    /// Signature/structure failures yield `TokenInvalid`; a genuine token at
    /// or past its expiry yields `TokenExpired`.
    pub fn verify_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let claims: AccessClaims = self.keys.decode(token)?;
        if now.timestamp() >= claims.exp {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims.principal())
    }

    /// Sign a refresh token for the user and persist its digest.
    pub async fn issue_refresh_token(&self, user_id: &str) -> Result<IssuedRefreshToken, AuthError> {
        self.issue_refresh_token_at(user_id, Utc::now()).await
    }

    pub async fn issue_refresh_token_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefreshToken, AuthError> {
        let expires_at = now + self.refresh_ttl;
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = self.keys.sign(&claims)?;
        self.store
            .store_refresh_token(RefreshTokenRecord {
                token_hash: hash_refresh_token(&token),
                user_id: user_id.to_string(),
                expires_at,
            })
            .await?;
        Ok(IssuedRefreshToken { token, expires_at })
    }

    /// Issue an access + refresh token pair for a user.
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let access_token = self.issue_access_token(&Principal::from(user))?;
        let refresh = self.issue_refresh_token(&user.id).await?;
        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
            expires_in: self.access_ttl_secs(),
            refresh_expires_in: self.refresh_ttl_secs(),
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims: RefreshClaims = self
            .keys
            .decode(refresh_token)
            .map_err(|_| AuthError::RefreshInvalid)?;
        if now.timestamp() >= claims.exp {
            debug!(user_id = %claims.sub, "refresh token past its signed expiry");
            return Err(AuthError::RefreshInvalid);
        }

        let record = self
            .store
            .find_refresh_token(&hash_refresh_token(refresh_token))
            .await?
            .ok_or(AuthError::RefreshInvalid)?;
        if record.user_id != claims.sub || now >= record.expires_at {
            return Err(AuthError::RefreshInvalid);
        }

        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::RefreshInvalid)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        self.issue_access_token_at(&Principal::from(&user), now)
    }

    /// Subject of a refresh token with a valid signature, expired or not.
    ///
    /// Lets logout identify the user when the access token is gone.
    pub fn refresh_token_subject(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims: RefreshClaims = self
            .keys
            .decode(refresh_token)
            .map_err(|_| AuthError::RefreshInvalid)?;
        Ok(claims.sub)
    }

    /// Delete every refresh token owned by the user. Idempotent.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AuthError> {
        let removed = self.store.delete_refresh_tokens_for_user(user_id).await?;
        info!(user_id, removed, "revoked refresh tokens");
        Ok(removed)
    }
}
