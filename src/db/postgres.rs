use crate::db::models::{ProfileUpdate, User};
use crate::db::store::CredentialStore;
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, current_refresh_token, \
     full_name, avatar_url, cover_image_url, created_at, updated_at";

/// Postgres-backed credential store. The refresh-token CAS is a conditional
/// UPDATE, so rotation races are settled by the database.
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR lower(email) = $1"
        ))
        .bind(identifier.to_lowercase())
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, current_refresh_token, \
             full_name, avatar_url, cover_image_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.current_refresh_token)
        .bind(&user.full_name)
        .bind(&user.avatar_url)
        .bind(&user.cover_image_url)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("email or username already exists".to_string())
            }
            _ => e.into(),
        })?;

        Ok(created)
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
             full_name = COALESCE($2, full_name), \
             avatar_url = COALESCE($3, avatar_url), \
             cover_image_url = COALESCE($4, cover_image_url), \
             updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.full_name)
        .bind(&update.avatar_url)
        .bind(&update.cover_image_url)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("user does not exist".to_string()))?;

        Ok(user)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("user does not exist".to_string()));
        }
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET current_refresh_token = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("user does not exist".to_string()));
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, AppError> {
        // IS NOT DISTINCT FROM treats two NULLs as equal, so an empty
        // expectation participates in the CAS like any other value.
        let result = sqlx::query(
            "UPDATE users SET current_refresh_token = $3, updated_at = now() \
             WHERE id = $1 AND current_refresh_token IS NOT DISTINCT FROM $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
