//! Authentication service: password login, refresh and logout flows
//! delegating to `tradegate_core::auth`.

use tracing::{info, warn};
use tradegate_core::auth::AuthError;
use tradegate_core::auth::password::check_password;
use tradegate_core::auth::tokens::{TokenPair, TokenService};
use tradegate_core::models::auth::User;
use tradegate_core::store::CredentialStore;

use crate::error::{AppError, AppResult};
use crate::models::{AuthUser, LoginResponse, RefreshResponse, TOKEN_TYPE};

/// Successful password login.
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
}

impl LoginOutcome {
    pub fn response(&self) -> LoginResponse {
        LoginResponse {
            access_token: self.tokens.access_token.clone(),
            refresh_token: self.tokens.refresh_token.clone(),
            expires_in: self.tokens.expires_in,
            token_type: TOKEN_TYPE.to_string(),
            user: AuthUser::from(&self.user),
        }
    }
}

/// Authenticate with email + password.
///
/// Unknown email, federated-only account and wrong password are
/// indistinguishable to the caller. The active flag is checked only after
/// the password matched.
pub async fn login(
    store: &dyn CredentialStore,
    tokens: &TokenService,
    email: &str,
    password: &str,
) -> AppResult<LoginOutcome> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }

    let found = store
        .find_user_by_email(&email)
        .await
        .map_err(AuthError::from)?;
    check_password(
        password,
        found.as_ref().and_then(|u| u.password_hash.as_deref()),
    )?;
    let Some(stored) = found else {
        return Err(AuthError::CredentialError.into());
    };
    if !stored.user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    let user = store
        .record_login(&stored.user.id, None)
        .await
        .map_err(AuthError::from)?;
    let pair = tokens.issue_token_pair(&user).await?;
    info!(user_id = %user.id, "password login");
    Ok(LoginOutcome { user, tokens: pair })
}

/// Exchange a refresh token for a new access token.
pub async fn refresh(tokens: &TokenService, refresh_token: Option<&str>) -> AppResult<RefreshResponse> {
    let refresh_token = refresh_token
        .filter(|t| !t.is_empty())
        .ok_or(AppError::RefreshInvalid)?;
    let access_token = tokens.refresh(refresh_token).await?;
    Ok(RefreshResponse {
        access_token,
        expires_in: tokens.access_ttl_secs(),
        token_type: TOKEN_TYPE.to_string(),
    })
}

/// Revoke every refresh token of the user, if one can be identified.
///
/// Never fails: logout reports success whatever happens here.
pub async fn logout(tokens: &TokenService, user_id: Option<&str>) {
    let Some(user_id) = user_id else {
        info!("logout without identifiable user");
        return;
    };
    if let Err(e) = tokens.revoke_all_for_user(user_id).await {
        warn!(user_id, error = %e, "failed to revoke refresh tokens on logout");
    }
}
