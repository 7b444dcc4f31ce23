use crate::db::models::{ProfileUpdate, User};
use crate::db::store::CredentialStore;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process credential store. Backs the test suites and local runs that
/// have no Postgres; the CAS runs under the map's write lock, which gives
/// the same one-winner guarantee the SQL store gets from a conditional
/// UPDATE.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let needle = identifier.to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.username == needle || u.email.to_lowercase() == needle)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let duplicate = users.values().any(|u| {
            u.username == user.username || u.email.to_lowercase() == user.email.to_lowercase()
        });
        if duplicate {
            return Err(AppError::Conflict(
                "email or username already exists".to_string(),
            ));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("user does not exist".to_string()))?;
        if let Some(full_name) = &update.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(avatar_url) = &update.avatar_url {
            user.avatar_url = Some(avatar_url.clone());
        }
        if let Some(cover_image_url) = &update.cover_image_url {
            user.cover_image_url = Some(cover_image_url.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("user does not exist".to_string()))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("user does not exist".to_string()))?;
        user.current_refresh_token = token.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let user = match users.get_mut(&id) {
            Some(user) => user,
            None => return Ok(false),
        };
        if user.current_refresh_token.as_deref() != expected {
            return Ok(false);
        }
        user.current_refresh_token = new.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Profile;

    fn sample_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "hash".to_string(),
            Profile {
                full_name: "Test User".to_string(),
                avatar_url: None,
                cover_image_url: None,
            },
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = MemoryStore::new();
        let user = store.create(&sample_user("ana", "ana@x.com")).await.unwrap();

        let by_name = store.find_by_identifier("ana").await.unwrap();
        assert_eq!(by_name.unwrap().id, user.id);

        let by_email = store.find_by_identifier("ana@x.com").await.unwrap();
        assert_eq!(by_email.unwrap().id, user.id);

        let by_id = store.find_by_id(user.id).await.unwrap();
        assert_eq!(by_id.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = MemoryStore::new();
        store.create(&sample_user("ana", "ana@x.com")).await.unwrap();

        let err = store
            .create(&sample_user("ana", "other@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = store
            .create(&sample_user("other", "ana@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_swap_refresh_token_is_conditional() {
        let store = MemoryStore::new();
        let user = store.create(&sample_user("ana", "ana@x.com")).await.unwrap();

        store.set_refresh_token(user.id, Some("t0")).await.unwrap();

        // Stale expectation loses.
        assert!(!store
            .swap_refresh_token(user.id, Some("other"), Some("t1"))
            .await
            .unwrap());

        // Matching expectation wins and the value changes.
        assert!(store
            .swap_refresh_token(user.id, Some("t0"), Some("t1"))
            .await
            .unwrap());
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.current_refresh_token.as_deref(), Some("t1"));

        // The losing expectation can no longer swap.
        assert!(!store
            .swap_refresh_token(user.id, Some("t0"), Some("t2"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_profile_partial() {
        let store = MemoryStore::new();
        let user = store.create(&sample_user("ana", "ana@x.com")).await.unwrap();

        let updated = store
            .update_profile(
                user.id,
                &ProfileUpdate {
                    avatar_url: Some("cdn/new.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Test User");
        assert_eq!(updated.avatar_url.as_deref(), Some("cdn/new.png"));
    }
}
