use crate::auth::password::PasswordHasher;
use crate::auth::token::{TokenClass, TokenSigner};
use crate::db::models::{Profile, PublicUser, User};
use crate::db::store::CredentialStore;
use crate::error::{AppError, TokenError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input to registration, already parsed out of whatever transport carried
/// it. Upload handling happens elsewhere; the image fields are references.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Orchestrates login, logout, refresh and password changes, and enforces
/// the single-active-refresh-token-per-user invariant.
///
/// Session state per user lives entirely in `current_refresh_token`:
/// empty means no session, otherwise exactly the last-issued token.
/// Revocation is total replacement; there is no token history.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    signer: Arc<TokenSigner>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        signer: Arc<TokenSigner>,
    ) -> Self {
        Self {
            store,
            hasher,
            signer,
        }
    }

    pub async fn register(&self, account: NewAccount) -> Result<PublicUser, AppError> {
        let username = account.username.trim().to_lowercase();
        let email = account.email.trim().to_string();
        let full_name = account.full_name.trim().to_string();

        // Blankness is judged on the trimmed value, but the password is
        // hashed exactly as supplied; login verifies the raw string.
        if username.is_empty()
            || email.is_empty()
            || full_name.is_empty()
            || account.password.trim().is_empty()
        {
            return Err(AppError::Validation("all fields are required".to_string()));
        }
        let avatar_url = match account.avatar_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                return Err(AppError::Validation(
                    "avatar reference is required".to_string(),
                ))
            }
        };

        for identifier in [username.as_str(), email.as_str()] {
            if self.store.find_by_identifier(identifier).await?.is_some() {
                return Err(AppError::Conflict(
                    "email or username already exists".to_string(),
                ));
            }
        }

        let password_hash = self.hasher.hash(&account.password)?;
        let user = User::new(
            username,
            email,
            password_hash,
            Profile {
                full_name,
                avatar_url: Some(avatar_url),
                cover_image_url: account
                    .cover_image_url
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty()),
            },
        );

        let created = self.store.create(&user).await?;
        info!("registered user {} ({})", created.username, created.id);
        Ok(created.sanitized())
    }

    /// Verifies credentials and opens a session, overwriting any prior
    /// refresh token. A previous session for the same user is silently
    /// revoked: one session at a time.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AppError::Validation(
                "username or email is required".to_string(),
            ));
        }

        let user = self
            .store
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound("username or email does not exist".to_string()))?;

        if !self.hasher.verify(password, &user.password_hash) {
            warn!("failed login attempt for user {}", user.id);
            return Err(AppError::Unauthorized("invalid password".to_string()));
        }

        let tokens = TokenPair {
            access_token: self.signer.issue_access(user.id)?,
            refresh_token: self.signer.issue_refresh(user.id)?,
        };
        self.store
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        info!("user {} logged in", user.id);
        Ok(LoginOutcome {
            user: user.sanitized(),
            tokens,
        })
    }

    /// Rotation-on-use. The presented token must verify as a refresh token
    /// AND equal the stored value exactly; on success a brand-new pair is
    /// issued and the stored token swapped in one conditional write, so of
    /// two racing refreshes exactly one wins. A well-signed token that no
    /// longer matches the stored value signals leakage or a stale client:
    /// the stored token is cleared, forcing re-login.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AppError> {
        let claims = self.signer.verify(presented, TokenClass::Refresh)?;
        let subject = TokenSigner::subject(&claims)?;

        let user = self
            .store
            .find_by_id(subject)
            .await?
            .ok_or_else(|| AppError::NotFound("user does not exist".to_string()))?;

        if user.current_refresh_token.as_deref() != Some(presented) {
            warn!(
                "refresh token reuse detected for user {}; revoking session",
                user.id
            );
            // Conditional clear: don't clobber a token a concurrent
            // legitimate rotation may have just written.
            self.store
                .swap_refresh_token(user.id, user.current_refresh_token.as_deref(), None)
                .await?;
            return Err(TokenError::Reused.into());
        }

        let tokens = TokenPair {
            access_token: self.signer.issue_access(user.id)?,
            refresh_token: self.signer.issue_refresh(user.id)?,
        };

        let rotated = self
            .store
            .swap_refresh_token(user.id, Some(presented), Some(&tokens.refresh_token))
            .await?;
        if !rotated {
            // A concurrent refresh won the race; this caller's token is
            // spent. Nothing was written on this path.
            warn!("lost refresh rotation race for user {}", user.id);
            return Err(TokenError::Reused.into());
        }

        info!("rotated refresh token for user {}", user.id);
        Ok(tokens)
    }

    /// Clears the stored refresh token. Idempotent: logging out twice, or
    /// logging out a since-deleted user, is not an error.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        match self.store.set_refresh_token(user_id, None).await {
            Ok(()) => {
                info!("user {} logged out", user_id);
                Ok(())
            }
            Err(AppError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Re-hashes and stores the new password. Existing sessions stay
    /// valid; the refresh token is left in place.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user does not exist".to_string()))?;

        if !self.hasher.verify(old_password, &user.password_hash) {
            warn!("password change with wrong old password for user {}", user.id);
            return Err(AppError::Unauthorized("old password is incorrect".to_string()));
        }

        if new_password.trim().is_empty() {
            return Err(AppError::Validation(
                "new password must not be blank".to_string(),
            ));
        }
        let new_hash = self.hasher.hash(new_password)?;
        self.store.update_password_hash(user.id, &new_hash).await?;

        info!("password changed for user {}", user.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::StaticKeys;
    use crate::db::memory::MemoryStore;
    use chrono::Duration;

    fn manager() -> SessionManager {
        let signer = Arc::new(TokenSigner::new(
            Arc::new(StaticKeys::from_secrets("access_secret", "refresh_secret")),
            Duration::minutes(15),
            Duration::days(7),
        ));
        SessionManager::new(Arc::new(MemoryStore::new()), PasswordHasher::new(), signer)
    }

    fn account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            full_name: "Ana Example".to_string(),
            avatar_url: Some("cdn/avatar.png".to_string()),
            cover_image_url: None,
        }
    }

    #[tokio::test]
    async fn test_register_normalizes_username() {
        let sessions = manager();
        let user = sessions.register(account("  AnA ", "ana@x.com")).await.unwrap();
        assert_eq!(user.username, "ana");
    }

    #[tokio::test]
    async fn test_register_rejects_blank_fields() {
        let sessions = manager();
        let mut blank = account("ana", "ana@x.com");
        blank.password = "   ".to_string();
        let err = sessions.register(blank).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_requires_avatar_but_not_cover() {
        let sessions = manager();

        let mut no_avatar = account("ana", "ana@x.com");
        no_avatar.avatar_url = None;
        let err = sessions.register(no_avatar).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Cover image stays optional.
        let user = sessions.register(account("bea", "bea@x.com")).await.unwrap();
        assert!(user.cover_image_url.is_none());
    }

    #[tokio::test]
    async fn test_register_conflict_is_case_insensitive() {
        let sessions = manager();
        sessions.register(account("ana", "ana@x.com")).await.unwrap();

        let err = sessions
            .register(account("ANA", "other@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = sessions
            .register(account("other", "ana@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Email conflicts are case-insensitive too.
        let err = sessions
            .register(account("third", "ANA@X.COM"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_unknown_vs_wrong_password() {
        let sessions = manager();
        sessions.register(account("ana", "ana@x.com")).await.unwrap();

        let err = sessions.login("nobody", "secret1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = sessions.login("ana", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
