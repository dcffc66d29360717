//! Authentication domain models.
//!
//! `Identity` is the only user shape that leaves this crate. It has no
//! password or refresh-token field, and its catch-all `extra` map drops those
//! keys on decode, so anything decoded into it (store rows, cache snapshots
//! written by other features) is sanitized by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Keys that must never appear in a cached or returned identity.
pub const SECRET_FIELDS: [&str; 2] = ["password", "refresh_token"];

/// Minimal identity carried inside signed tokens.
///
/// Only `id` is trusted for authorization; `name` and `email` are
/// denormalized convenience copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Full claim set of a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: IdentityClaim,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Per-token nonce; keeps rotated tokens distinct within the same second.
    pub jti: String,
}

/// A quiz bookmarked by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuiz {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub created_at: DateTime<Utc>,
}

/// A follow edge from `user_id` to `author_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub user_id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

/// Sanitized user record with relations, as cached and returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_author: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub followers_count: i32,
    #[serde(default)]
    pub following_count: i32,
    #[serde(default)]
    pub saved_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub saved_quizes: Vec<SavedQuiz>,
    #[serde(default)]
    pub following: Vec<Follow>,
    /// Fields written by other features, carried through untouched.
    #[serde(flatten, deserialize_with = "without_secrets")]
    pub extra: Map<String, Value>,
}

fn without_secrets<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut fields = Map::deserialize(deserializer)?;
    for key in SECRET_FIELDS {
        fields.remove(key);
    }
    Ok(fields)
}

impl Identity {
    /// Minimal claim to embed in freshly minted tokens.
    pub fn claim(&self) -> IdentityClaim {
        IdentityClaim {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Minimal projection used by the refresh-token lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub image_url: Option<String>,
}

impl UserSummary {
    /// Minimal claim to embed in freshly minted tokens.
    pub fn claim(&self) -> IdentityClaim {
        IdentityClaim {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Login-only projection: summary plus the stored password hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub summary: UserSummary,
    pub password_hash: Option<String>,
}
