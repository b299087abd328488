//! Microsoft identity platform (Azure AD) provider.
//!
//! Authorization-code flow with PKCE against the v2.0 endpoints, then a
//! profile lookup on Microsoft Graph `/me`.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{IdentityProvider, ProviderProfile};
use crate::auth::AuthError;

/// Default authority host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default profile endpoint.
pub const DEFAULT_USERINFO_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Scopes requested at the authorize endpoint.
const SCOPES: &str = "openid profile email User.Read";

/// Federated provider settings.
#[derive(Clone, Debug)]
pub struct AzureConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Directory (tenant) id, or `common` / `organizations`.
    pub tenant: String,
    /// Callback URL registered with the provider.
    pub redirect_url: String,
    pub authority: String,
    pub userinfo_url: String,
}

impl AzureConfig {
    fn authorize_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }
}

/// Response from the token endpoint. Only the access token is used.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
}

/// Azure AD identity provider.
pub struct AzureProvider {
    client: reqwest::Client,
    config: AzureConfig,
}

impl AzureProvider {
    pub fn new(client: reqwest::Client, config: AzureConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for AzureProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<Url, AuthError> {
        Url::parse_with_params(
            &self.config.authorize_endpoint(),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_mode", "form_post"),
                ("scope", SCOPES),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::Internal(format!("authorize url: {e}")))
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderProfile, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("code_verifier", code_verifier),
            ("scope", SCOPES),
        ];

        let resp = self
            .client
            .post(self.config.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Handshake(format!("token exchange failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Handshake(format!(
                "token exchange HTTP {status}: {body}"
            )));
        }

        let tokens = resp
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|e| AuthError::Handshake(format!("token response parse error: {e}")))?;

        let resp = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Handshake(format!("profile request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AuthError::Handshake(format!(
                "profile request HTTP {}",
                resp.status()
            )));
        }

        resp.json::<ProviderProfile>()
            .await
            .map_err(|e| AuthError::Handshake(format!("profile parse error: {e}")))
    }
}
