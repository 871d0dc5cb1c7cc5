//! User repository: the credential store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{RepositoryError, RepositoryResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, ResetToken, UpdateUser, User};

/// Storage abstraction for user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user; a taken email yields `RepositoryError::Conflict`
    async fn create(&self, new_user: &NewUser) -> RepositoryResult<User>;

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>>;

    /// Apply the non-empty fields of `changes`
    async fn update(&self, id: Uuid, changes: &UpdateUser) -> RepositoryResult<User>;

    /// Attach a reset token (and its expiry) to the user
    async fn store_reset_token(&self, user_id: Uuid, reset: &ResetToken) -> RepositoryResult<()>;

    /// Find the user holding `token`, provided it has not expired at `now`
    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<User>>;

    /// Set a new password hash and clear the token in one step.
    ///
    /// Returns `false` when no live token matched.
    async fn complete_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> RepositoryResult<bool>;
}

/// Shared handle on a user repository
pub type UserStore = Arc<dyn UserRepository>;

const USER_COLUMNS: &str = "id, name, email, password_hash, reset_token, reset_expires_at, \
                            profile_image, created_at, updated_at";

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        reset: ResetToken::from_columns(row.get("reset_token"), row.get("reset_expires_at")),
        profile_image: row.get("profile_image"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: &NewUser) -> RepositoryResult<User> {
        info!("Creating new user: {}", new_user.email);

        let row = sqlx::query(&format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(user_from_row(&row))
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_query)?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_query)?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn update(&self, id: Uuid, changes: &UpdateUser) -> RepositoryResult<User> {
        info!("Updating user: {}", id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                profile_image = COALESCE($5, profile_image),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(changes.profile_image.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(user_from_row(&row))
    }

    async fn store_reset_token(&self, user_id: Uuid, reset: &ResetToken) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&reset.token)
        .bind(reset.expires_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1 AND reset_expires_at > $2"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn complete_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3,
                reset_token = NULL,
                reset_expires_at = NULL,
                updated_at = NOW()
            WHERE reset_token = $1 AND reset_expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_query)?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-process user repository, used by tests and the `memory` backend
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, new_user: &NewUser) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::Conflict("users_email_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            reset: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, changes: &UpdateUser) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        if let Some(email) = &changes.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(RepositoryError::Conflict("users_email_key".to_string()));
            }
        }

        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &changes.name {
            user.name = name.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(image) = &changes.profile_image {
            user.profile_image = Some(image.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn store_reset_token(&self, user_id: Uuid, reset: &ResetToken) -> RepositoryResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(RepositoryError::NotFound)?;
        user.reset = Some(reset.clone());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.reset
                    .as_ref()
                    .is_some_and(|r| r.token == token && r.is_valid_at(now))
            })
            .cloned())
    }

    async fn complete_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> RepositoryResult<bool> {
        let mut users = self.users.write().await;
        let holder = users.values_mut().find(|u| {
            u.reset
                .as_ref()
                .is_some_and(|r| r.token == token && r.is_valid_at(now))
        });

        match holder {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.reset = None;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
