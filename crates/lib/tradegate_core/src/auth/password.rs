//! Password login credentials.
//!
//! Only accounts created with a password carry a bcrypt hash; federated
//! accounts have none and can never pass [`check_password`].

use std::sync::LazyLock;

use tracing::warn;

use super::AuthError;

const BCRYPT_COST: u32 = 10;

/// Verified against when the account has no hash, so an unknown email costs
/// the same bcrypt round as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| bcrypt::hash("tradegate-no-password", BCRYPT_COST).ok());

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Check `password` against the stored hash, if any.
///
/// A missing hash, a mismatch and a corrupt stored hash all yield
/// `CredentialError`.
pub fn check_password(password: &str, stored_hash: Option<&str>) -> Result<(), AuthError> {
    let Some(hash) = stored_hash else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = bcrypt::verify(password, dummy);
        }
        return Err(AuthError::CredentialError);
    };
    match bcrypt::verify(password, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AuthError::CredentialError),
        Err(e) => {
            warn!(error = %e, "stored password hash is unreadable");
            Err(AuthError::CredentialError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_password_passes() {
        let hash = hash_password("correct horse").unwrap();
        assert!(check_password("correct horse", Some(&hash)).is_ok());
    }

    #[test]
    fn wrong_missing_and_corrupt_hashes_are_credential_errors() {
        let hash = hash_password("correct horse").unwrap();
        for stored in [Some(hash.as_str()), None, Some("not-a-bcrypt-hash")] {
            assert!(matches!(
                check_password("battery staple", stored),
                Err(AuthError::CredentialError)
            ));
        }
    }
}
