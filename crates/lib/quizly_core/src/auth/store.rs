//! User store: the system of record for user rows.
//!
//! The resolver only needs lookups by id and by current refresh token, plus
//! the refresh-token column write that implements rotation. Every projection
//! returned here omits the password hash and the refresh-token value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Map;
use sqlx::{PgConnection, PgPool};

use super::AuthError;
use super::jwt::hash_refresh_token;
use crate::models::auth::{Follow, Identity, SavedQuiz, UserCredentials, UserSummary};

/// Store operations consumed by the session resolver and login flow.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load the full sanitized record (with relations) by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, AuthError>;

    /// Find the user whose current refresh token equals `token`.
    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<UserSummary>, AuthError>;

    /// Replace the user's refresh token and return the full record.
    async fn set_refresh_token(&self, id: &str, token: &str) -> Result<Identity, AuthError>;

    /// Forget the user's refresh token so it can no longer be rotated.
    async fn clear_refresh_token(&self, id: &str) -> Result<(), AuthError>;

    /// Fetch login credentials by email.
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str = "id, name, email, bio, image_url, is_private, is_author, is_admin, \
     followers_count, following_count, saved_count, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: Option<String>,
    bio: Option<String>,
    image_url: Option<String>,
    is_private: bool,
    is_author: bool,
    is_admin: bool,
    followers_count: i32,
    following_count: i32,
    saved_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_identity(self, saved_quizes: Vec<SavedQuiz>, following: Vec<Follow>) -> Identity {
        Identity {
            id: self.id,
            name: self.name,
            email: self.email,
            bio: self.bio,
            image_url: self.image_url,
            is_private: self.is_private,
            is_author: self.is_author,
            is_admin: self.is_admin,
            followers_count: self.followers_count,
            following_count: self.following_count,
            saved_count: self.saved_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            saved_quizes,
            following,
            extra: Map::new(),
        }
    }
}

/// `UserStore` over the `users`, `saved_quizes` and `followers` tables.
///
/// Refresh tokens are stored as SHA-256 digests; lookups hash the presented
/// token and compare digests.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn load_relations(
    conn: &mut PgConnection,
    user_id: &str,
) -> Result<(Vec<SavedQuiz>, Vec<Follow>), AuthError> {
    let saved = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
        "SELECT id, user_id, quiz_id, created_at FROM saved_quizes \
         WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let following = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
        "SELECT id, user_id, author_id, created_at FROM followers \
         WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok((
        saved
            .into_iter()
            .map(|(id, user_id, quiz_id, created_at)| SavedQuiz {
                id,
                user_id,
                quiz_id,
                created_at,
            })
            .collect(),
        following
            .into_iter()
            .map(|(id, user_id, author_id, created_at)| Follow {
                id,
                user_id,
                author_id,
                created_at,
            })
            .collect(),
    ))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        let (saved, following) = load_relations(&mut conn, &row.id).await?;
        Ok(Some(row.into_identity(saved, following)))
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<UserSummary>, AuthError> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT id, name, email, image_url FROM users WHERE refresh_token_hash = $1",
        )
        .bind(hash_refresh_token(token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, name, email, image_url)| UserSummary {
            id,
            name,
            email,
            image_url,
        }))
    }

    async fn set_refresh_token(&self, id: &str, token: &str) -> Result<Identity, AuthError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET refresh_token_hash = $2 WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(hash_refresh_token(token))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AuthError::UserNotFound(id.to_string()))?;

        let (saved, following) = load_relations(&mut *tx, &row.id).await?;
        tx.commit().await?;
        Ok(row.into_identity(saved, following))
    }

    async fn clear_refresh_token(&self, id: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET refresh_token_hash = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, Option<String>)>(
            "SELECT id, name, email, image_url, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, name, email, image_url, password_hash)| UserCredentials {
                summary: UserSummary {
                    id,
                    name,
                    email,
                    image_url,
                },
                password_hash,
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// A user row held by `MemoryUserStore`, secrets included.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub identity: Identity,
    pub password_hash: Option<String>,
    pub refresh_token: Option<String>,
}

impl StoredUser {
    fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.identity.id.clone(),
            name: self.identity.name.clone(),
            email: self.identity.email.clone(),
            image_url: self.identity.image_url.clone(),
        }
    }
}

/// `UserStore` kept in process memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<String, StoredUser>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user row.
    pub fn insert(&self, user: StoredUser) {
        self.users.insert(user.identity.id.clone(), user);
    }

    /// Remove a user row, as account deletion would.
    pub fn remove(&self, id: &str) {
        self.users.remove(id);
    }

    /// Current raw refresh token for `id`.
    pub fn refresh_token_of(&self, id: &str) -> Option<String> {
        self.users.get(id).and_then(|u| u.refresh_token.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.users.get(id).map(|u| u.identity.clone()))
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<UserSummary>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.refresh_token.as_deref() == Some(token))
            .map(|u| u.summary()))
    }

    async fn set_refresh_token(&self, id: &str, token: &str) -> Result<Identity, AuthError> {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| AuthError::UserNotFound(id.to_string()))?;
        user.refresh_token = Some(token.to_string());
        Ok(user.identity.clone())
    }

    async fn clear_refresh_token(&self, id: &str) -> Result<(), AuthError> {
        if let Some(mut user) = self.users.get_mut(id) {
            user.refresh_token = None;
        }
        Ok(())
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.identity.email.as_deref() == Some(email))
            .map(|u| UserCredentials {
                summary: u.summary(),
                password_hash: u.password_hash.clone(),
            }))
    }
}
