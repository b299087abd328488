//! Federated identity bridge.
//!
//! Turns an external single-sign-on handshake into a locally owned user:
//!
//! 1. `begin`: store a PKCE verifier under a fresh `state`, return the
//!    provider's authorize URL.
//! 2. `finish`: take the pending handshake, exchange the code, validate the
//!    returned profile into a [`FederatedIdentity`].
//! 3. `resolve_user`: find the user by email, or provision the tenant (by
//!    email domain, trial license) and the user just in time.
//! 4. `complete`: issue the access/refresh pair for the resolved user.

pub mod azure;
pub mod pkce;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::auth::AuthError;
use crate::auth::tokens::{TokenPair, TokenService};
use crate::models::auth::{DEFAULT_ROLE, NewTenant, NewUser, TRIAL_LICENSE, User};
use crate::store::CredentialStore;

use self::pkce::{
    HandshakeStore, PendingHandshake, compute_code_challenge, generate_code_verifier,
    generate_state,
};

/// Profile payload returned by the provider.
///
/// Every field is optional on the wire; [`FederatedIdentity`] decides what
/// is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub display_name: Option<String>,
}

/// Validated identity assertion from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Provider subject id (Azure object id).
    pub subject: String,
    /// Lower-cased email.
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl FederatedIdentity {
    /// Domain part of the email; tenants are keyed by it.
    pub fn domain(&self) -> &str {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or_default()
    }
}

/// Normalize an email claim, rejecting anything without a local part and a domain.
fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    match email.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Some(email),
        _ => None,
    }
}

impl TryFrom<ProviderProfile> for FederatedIdentity {
    type Error = AuthError;

    fn try_from(profile: ProviderProfile) -> Result<Self, Self::Error> {
        let email = profile
            .mail
            .as_deref()
            .and_then(normalize_email)
            .or_else(|| {
                profile
                    .user_principal_name
                    .as_deref()
                    .and_then(normalize_email)
            })
            .ok_or(AuthError::MissingEmail)?;

        let subject = profile
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::Handshake("profile carries no subject id".into()))?;

        // Fall back to splitting the display name when structured names are absent.
        let (display_first, display_last) = match profile.display_name.as_deref() {
            Some(name) => match name.trim().split_once(' ') {
                Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
                None if !name.trim().is_empty() => (Some(name.trim().to_string()), None),
                None => (None, None),
            },
            None => (None, None),
        };

        Ok(Self {
            subject,
            email,
            first_name: profile.given_name.or(display_first),
            last_name: profile.surname.or(display_last),
        })
    }
}

/// External provider contract.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the client is redirected to when sign-in starts.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<Url, AuthError>;

    /// Exchange the callback's authorization code for the user's profile.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderProfile, AuthError>;
}

/// License terms for tenants created on first sign-in.
#[derive(Debug, Clone, Copy)]
pub struct TrialPolicy {
    pub license_days: i64,
    pub max_users: i32,
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            license_days: 30,
            max_users: 5,
        }
    }
}

impl TrialPolicy {
    fn new_tenant(&self, domain: &str, now: DateTime<Utc>) -> NewTenant {
        NewTenant {
            name: domain.to_string(),
            domain: domain.to_string(),
            license_type: TRIAL_LICENSE.to_string(),
            license_expires_at: now + Duration::days(self.license_days),
            max_users: self.max_users,
        }
    }
}

/// Outcome of a completed federated sign-in.
#[derive(Debug, Clone)]
pub struct FederatedLogin {
    pub user: User,
    pub tokens: TokenPair,
    /// Whether the user was provisioned by this sign-in.
    pub created: bool,
}

/// Drives the federated handshake and user resolution.
pub struct FederatedBridge {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    provider: Arc<dyn IdentityProvider>,
    handshakes: HandshakeStore,
    trial: TrialPolicy,
}

impl FederatedBridge {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            tokens,
            provider,
            handshakes: HandshakeStore::new(),
            trial: TrialPolicy::default(),
        }
    }

    pub fn with_trial_policy(mut self, trial: TrialPolicy) -> Self {
        self.trial = trial;
        self
    }

    /// Start a handshake: remember the PKCE verifier and return the provider URL.
    pub fn begin(&self) -> Result<Url, AuthError> {
        let state = generate_state();
        let verifier = generate_code_verifier();
        let url = self
            .provider
            .authorization_url(&state, &compute_code_challenge(&verifier))?;
        self.handshakes
            .insert(state, PendingHandshake::new(verifier));
        Ok(url)
    }

    /// Handle the provider callback and sign the user in.
    pub async fn finish(&self, code: &str, state: &str) -> Result<FederatedLogin, AuthError> {
        let pending = self
            .handshakes
            .take(state)
            .ok_or_else(|| AuthError::Handshake("unknown or expired state".into()))?;
        let profile = self
            .provider
            .exchange_code(code, &pending.code_verifier)
            .await?;
        let identity = FederatedIdentity::try_from(profile)?;
        self.complete(&identity).await
    }

    /// Resolve the identity to a local user and issue its token pair.
    pub async fn complete(&self, identity: &FederatedIdentity) -> Result<FederatedLogin, AuthError> {
        let (user, created) = self.resolve_user(identity).await?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        let tokens = self.tokens.issue_token_pair(&user).await?;
        info!(
            user_id = %user.id,
            tenant_id = %user.tenant_id,
            created,
            "federated sign-in completed"
        );
        Ok(FederatedLogin {
            user,
            tokens,
            created,
        })
    }

    /// Find the user by email or provision tenant and user just in time.
    ///
    /// Both creations are lookup-or-insert in the store, so repeated or
    /// concurrent callbacks for one email never duplicate either record.
    pub async fn resolve_user(&self, identity: &FederatedIdentity) -> Result<(User, bool), AuthError> {
        if let Some(existing) = self.store.find_user_by_email(&identity.email).await? {
            let user = self
                .store
                .record_login(&existing.user.id, Some(&identity.subject))
                .await?;
            return Ok((user, false));
        }

        let tenant = self
            .store
            .find_or_create_tenant(self.trial.new_tenant(identity.domain(), Utc::now()))
            .await?;

        let (user, created) = self
            .store
            .create_user_if_absent(NewUser {
                email: identity.email.clone(),
                tenant_id: tenant.id.clone(),
                role: DEFAULT_ROLE.to_string(),
                is_active: true,
                azure_id: Some(identity.subject.clone()),
                first_name: identity.first_name.clone(),
                last_name: identity.last_name.clone(),
                password_hash: None,
            })
            .await?;

        if created {
            info!(email = %user.email, tenant = %tenant.domain, "provisioned federated user");
            return Ok((user, true));
        }

        let user = self
            .store
            .record_login(&user.id, Some(&identity.subject))
            .await?;
        Ok((user, false))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::store::MemoryCredentialStore;

    /// Provider double returning a fixed profile.
    struct StaticProvider {
        profile: ProviderProfile,
        seen_verifiers: Mutex<Vec<String>>,
    }

    impl StaticProvider {
        fn new(profile: ProviderProfile) -> Self {
            Self {
                profile,
                seen_verifiers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<Url, AuthError> {
            Url::parse_with_params(
                "https://idp.test/authorize",
                &[("state", state), ("code_challenge", code_challenge)],
            )
            .map_err(|e| AuthError::Internal(e.to_string()))
        }

        async fn exchange_code(
            &self,
            _code: &str,
            code_verifier: &str,
        ) -> Result<ProviderProfile, AuthError> {
            self.seen_verifiers
                .lock()
                .unwrap()
                .push(code_verifier.to_string());
            Ok(self.profile.clone())
        }
    }

    fn profile(id: &str, mail: &str) -> ProviderProfile {
        ProviderProfile {
            id: Some(id.into()),
            mail: Some(mail.into()),
            given_name: Some("Ana".into()),
            surname: Some("Silva".into()),
            ..Default::default()
        }
    }

    fn identity(subject: &str, email: &str) -> FederatedIdentity {
        FederatedIdentity::try_from(profile(subject, email)).unwrap()
    }

    fn bridge_with(
        store: Arc<MemoryCredentialStore>,
        provider: Arc<StaticProvider>,
    ) -> FederatedBridge {
        let tokens = TokenService::new(b"test-secret", 3600, 86400, store.clone());
        FederatedBridge::new(store, tokens, provider)
    }

    fn bridge(store: Arc<MemoryCredentialStore>) -> FederatedBridge {
        bridge_with(
            store,
            Arc::new(StaticProvider::new(profile("oid-1", "ana@acme.io"))),
        )
    }

    #[test]
    fn identity_prefers_mail_and_lowercases() {
        let id = identity("oid-1", "  Ana@ACME.io ");
        assert_eq!(id.email, "ana@acme.io");
        assert_eq!(id.domain(), "acme.io");
        assert_eq!(id.first_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn identity_falls_back_to_principal_name() {
        let id = FederatedIdentity::try_from(ProviderProfile {
            id: Some("oid-1".into()),
            user_principal_name: Some("bo@globex.com".into()),
            display_name: Some("Bo Jensen".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(id.email, "bo@globex.com");
        assert_eq!(id.first_name.as_deref(), Some("Bo"));
        assert_eq!(id.last_name.as_deref(), Some("Jensen"));
    }

    #[test]
    fn identity_without_email_is_missing_email() {
        let result = FederatedIdentity::try_from(ProviderProfile {
            id: Some("oid-1".into()),
            display_name: Some("No Mail".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AuthError::MissingEmail)));

        let result = FederatedIdentity::try_from(ProviderProfile {
            id: Some("oid-1".into()),
            mail: Some("not-an-email".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AuthError::MissingEmail)));
    }

    #[tokio::test]
    async fn first_sign_in_provisions_trial_tenant_and_user() {
        let store = Arc::new(MemoryCredentialStore::new());
        let login = bridge(store.clone())
            .complete(&identity("oid-1", "ana@acme.io"))
            .await
            .unwrap();

        assert!(login.created);
        assert_eq!(login.user.role, DEFAULT_ROLE);
        assert!(login.user.is_active);
        assert_eq!(login.user.azure_id.as_deref(), Some("oid-1"));

        let tenant = store.find_tenant_by_domain("acme.io").await.unwrap().unwrap();
        assert_eq!(tenant.id, login.user.tenant_id);
        assert_eq!(tenant.license_type, TRIAL_LICENSE);
        assert_eq!(tenant.max_users, 5);
        assert!(tenant.license_expires_at > Utc::now() + Duration::days(29));
        assert_eq!(store.refresh_token_count(&login.user.id).await, 1);
    }

    #[tokio::test]
    async fn missing_email_creates_nothing() {
        let store = Arc::new(MemoryCredentialStore::new());
        let provider = Arc::new(StaticProvider::new(ProviderProfile {
            id: Some("oid-1".into()),
            ..Default::default()
        }));
        let bridge = bridge_with(store.clone(), provider);

        let url = bridge.begin().unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let result = bridge.finish("code", &state).await;

        assert!(matches!(result, Err(AuthError::MissingEmail)));
        assert_eq!(store.user_count().await, 0);
        assert_eq!(store.tenant_count().await, 0);
    }

    #[tokio::test]
    async fn repeat_sign_in_reuses_user_and_backfills_subject() {
        let store = Arc::new(MemoryCredentialStore::new());
        let tenant = store
            .find_or_create_tenant(TrialPolicy::default().new_tenant("acme.io", Utc::now()))
            .await
            .unwrap();
        let (existing, _) = store
            .create_user_if_absent(NewUser {
                email: "ana@acme.io".into(),
                tenant_id: tenant.id.clone(),
                role: "admin".into(),
                is_active: true,
                azure_id: None,
                first_name: None,
                last_name: None,
                password_hash: None,
            })
            .await
            .unwrap();

        let login = bridge(store.clone())
            .complete(&identity("oid-9", "ana@acme.io"))
            .await
            .unwrap();

        assert!(!login.created);
        assert_eq!(login.user.id, existing.id);
        assert_eq!(login.user.role, "admin");
        assert_eq!(login.user.azure_id.as_deref(), Some("oid-9"));
        assert!(login.user.last_login_at.is_some());
        assert_eq!(store.user_count().await, 1);
        assert_eq!(store.tenant_count().await, 1);
    }

    #[tokio::test]
    async fn second_user_joins_existing_domain_tenant() {
        let store = Arc::new(MemoryCredentialStore::new());
        let bridge = bridge(store.clone());
        let a = bridge.complete(&identity("oid-1", "ana@acme.io")).await.unwrap();
        let b = bridge.complete(&identity("oid-2", "bo@acme.io")).await.unwrap();

        assert_ne!(a.user.id, b.user.id);
        assert_eq!(a.user.tenant_id, b.user.tenant_id);
        assert_eq!(store.tenant_count().await, 1);
    }

    #[tokio::test]
    async fn disabled_user_cannot_complete_sign_in() {
        let store = Arc::new(MemoryCredentialStore::new());
        let bridge = bridge(store.clone());
        let login = bridge.complete(&identity("oid-1", "ana@acme.io")).await.unwrap();
        store.set_active(&login.user.id, false).await.unwrap();

        assert!(matches!(
            bridge.complete(&identity("oid-1", "ana@acme.io")).await,
            Err(AuthError::AccountDisabled)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callbacks_for_new_email_create_one_user_and_tenant() {
        for _ in 0..10 {
            let store = Arc::new(MemoryCredentialStore::new());
            let bridge = Arc::new(bridge(store.clone()));

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let bridge = bridge.clone();
                    tokio::spawn(async move {
                        bridge.complete(&identity("oid-1", "new@initech.com")).await
                    })
                })
                .collect();

            let results = futures::future::join_all(handles).await;
            let ids: Vec<String> = results
                .into_iter()
                .map(|r| r.unwrap().unwrap().user.id)
                .collect();

            assert!(ids.iter().all(|id| id == &ids[0]));
            assert_eq!(store.user_count().await, 1);
            assert_eq!(store.tenant_count().await, 1);
        }
    }

    #[tokio::test]
    async fn finish_uses_the_verifier_stored_at_begin() {
        let store = Arc::new(MemoryCredentialStore::new());
        let provider = Arc::new(StaticProvider::new(profile("oid-1", "ana@acme.io")));
        let bridge = bridge_with(store, provider.clone());

        let url = bridge.begin().unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let state = &query.iter().find(|(k, _)| k == "state").unwrap().1;
        let challenge = &query.iter().find(|(k, _)| k == "code_challenge").unwrap().1;

        bridge.finish("code", state).await.unwrap();

        let verifiers = provider.seen_verifiers.lock().unwrap();
        assert_eq!(verifiers.len(), 1);
        assert_eq!(&compute_code_challenge(&verifiers[0]), challenge);
    }

    #[tokio::test]
    async fn finish_rejects_unknown_or_replayed_state() {
        let store = Arc::new(MemoryCredentialStore::new());
        let bridge = bridge(store);

        assert!(matches!(
            bridge.finish("code", "never-issued").await,
            Err(AuthError::Handshake(_))
        ));

        let url = bridge.begin().unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(bridge.finish("code", &state).await.is_ok());
        assert!(matches!(
            bridge.finish("code", &state).await,
            Err(AuthError::Handshake(_))
        ));
    }
}
