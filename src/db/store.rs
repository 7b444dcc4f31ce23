use crate::db::models::{ProfileUpdate, User};
use crate::error::AppError;
use async_trait::async_trait;
use uuid::Uuid;

/// Contract between the session core and whatever persists user records.
///
/// The store is the single source of truth for `current_refresh_token`;
/// `swap_refresh_token` must be atomic so that of two concurrent rotations
/// exactly one wins and the loser observes the changed value.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look a user up by username or email. Usernames are stored lowercase;
    /// callers normalize before querying.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Persist a new user record. Fails `Conflict` on duplicate username
    /// or email.
    async fn create(&self, user: &User) -> Result<User, AppError>;

    /// Apply a partial profile update, returning the updated record.
    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AppError>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Unconditionally overwrite the stored refresh token. `None` revokes.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError>;

    /// Compare-and-swap the stored refresh token: the write happens only if
    /// the stored value still equals `expected`. Returns whether the swap
    /// was applied.
    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, AppError>;
}
