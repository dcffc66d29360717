//! Session resolver: "who is calling, given these two tokens?"
//!
//! Evaluation order for a request:
//!
//! 1. no tokens: unauthenticated, nothing touched
//! 2. refresh token only: verify it, look the user up by its current stored
//!    value, rotate both tokens, write the full record through to the cache
//! 3. access token present: verify it (no fallback to rotation on failure),
//!    serve from cache, or load from the store and populate the cache
//!
//! Every failure collapses to `Resolution::Unauthenticated`; the specific
//! reason is only logged. Rotation is last-writer-wins: two requests
//! presenting the same refresh token concurrently can both rotate, and the
//! later write silently invalidates the token issued to the earlier one.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use super::cache::IdentityCache;
use super::jwt::{TokenCodec, TokenKind};
use super::password::verify_password;
use super::store::UserStore;
use super::{AuthError, AuthFailure};
use crate::models::auth::{Identity, IdentityClaim};

/// The two credential values read from the caller's carrier.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Build credentials, treating empty values (cleared cookies) as absent.
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }
}

/// Freshly minted token material to hand back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    /// Set when this resolution minted new tokens (rotation or login).
    pub issued: Option<TokenPair>,
}

/// Outcome of a resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    Authenticated(Session),
    Unauthenticated,
}

impl Resolution {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Resolution::Authenticated(session) => Some(&session.identity),
            Resolution::Unauthenticated => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            Resolution::Authenticated(session) => Some(session),
            Resolution::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Resolution::Authenticated(_))
    }
}

/// Resolves caller identity from credentials, rotating tokens as needed.
#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn IdentityCache>,
    codec: TokenCodec,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// Log a backing-store error and collapse it into the failure taxonomy.
fn backing(op: &'static str, e: AuthError) -> AuthFailure {
    warn!(op, error = %e, "backing store failure during resolution");
    AuthFailure::BackingStoreFailure
}

impl SessionResolver {
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn IdentityCache>,
        codec: TokenCodec,
    ) -> Self {
        Self {
            store,
            cache,
            codec,
        }
    }

    /// Token codec, for sizing credential lifetimes.
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Resolve the caller. Never fails; failures are logged and reported
    /// as `Unauthenticated`.
    pub async fn resolve(&self, credentials: &Credentials) -> Resolution {
        match self.try_resolve(credentials).await {
            Ok(session) => Resolution::Authenticated(session),
            Err(reason) => {
                debug!(%reason, "request unauthenticated");
                Resolution::Unauthenticated
            }
        }
    }

    pub(crate) async fn try_resolve(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, AuthFailure> {
        match (
            credentials.access_token.as_deref(),
            credentials.refresh_token.as_deref(),
        ) {
            (None, None) => Err(AuthFailure::NoCredentials),
            (None, Some(refresh_token)) => self.rotate(refresh_token).await,
            (Some(access_token), _) => self.from_access_token(access_token).await,
        }
    }

    async fn rotate(&self, refresh_token: &str) -> Result<Session, AuthFailure> {
        self.codec.verify(refresh_token, TokenKind::Refresh)?;

        let user = self
            .store
            .find_by_refresh_token(refresh_token)
            .await
            .map_err(|e| backing("find_by_refresh_token", e))?
            .ok_or(AuthFailure::UserNotFound)?;

        let issued = self.mint(&user.claim()).map_err(|e| backing("sign", e))?;

        let identity = self
            .store
            .set_refresh_token(&user.id, &issued.refresh_token)
            .await
            .map_err(|e| backing("set_refresh_token", e))?;

        self.write_through(&identity)
            .await
            .map_err(|e| backing("cache_set", e))?;

        info!(user_id = %identity.id, "rotated session tokens");
        Ok(Session {
            identity,
            issued: Some(issued),
        })
    }

    async fn from_access_token(&self, access_token: &str) -> Result<Session, AuthFailure> {
        let claims = self.codec.verify(access_token, TokenKind::Access)?;
        let user_id = claims.identity.id;

        let cached = self
            .cache
            .get(&user_id)
            .await
            .map_err(|e| backing("cache_get", e))?;

        if let Some(snapshot) = cached {
            match serde_json::from_str::<Identity>(&snapshot) {
                Ok(identity) => {
                    return Ok(Session {
                        identity,
                        issued: None,
                    });
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "undecodable identity snapshot, reloading");
                }
            }
        }

        let identity = self
            .store
            .find_by_id(&user_id)
            .await
            .map_err(|e| backing("find_by_id", e))?
            .ok_or(AuthFailure::UserNotFound)?;

        self.write_through(&identity)
            .await
            .map_err(|e| backing("cache_set", e))?;

        Ok(Session {
            identity,
            issued: None,
        })
    }

    fn mint(&self, claim: &IdentityClaim) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            refresh_token: self.codec.sign(claim, TokenKind::Refresh)?,
            access_token: self.codec.sign(claim, TokenKind::Access)?,
        })
    }

    async fn write_through(&self, identity: &Identity) -> Result<(), AuthError> {
        let snapshot = serde_json::to_string(identity)
            .map_err(|e| AuthError::CacheError(format!("encode snapshot: {e}")))?;
        self.cache.set(&identity.id, snapshot).await
    }

    /// Authenticate with email + password and start a new session.
    ///
    /// Unknown email and wrong password both yield `CredentialError`.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if password.is_empty() {
            return Err(AuthError::ValidationError("Password is required".into()));
        }
        if !is_valid_email(email) {
            return Err(AuthError::ValidationError(
                "Please enter valid email address".into(),
            ));
        }

        let credentials = self
            .store
            .find_credentials_by_email(email)
            .await?
            .ok_or(AuthError::CredentialError)?;

        let hash = credentials
            .password_hash
            .as_deref()
            .ok_or(AuthError::CredentialError)?;
        if !verify_password(password, hash)? {
            return Err(AuthError::CredentialError);
        }

        let issued = self.mint(&credentials.summary.claim())?;
        let identity = self
            .store
            .set_refresh_token(&credentials.summary.id, &issued.refresh_token)
            .await?;
        self.write_through(&identity).await?;

        info!(user_id = %identity.id, "user logged in");
        Ok(Session {
            identity,
            issued: Some(issued),
        })
    }

    /// End the session identified by `access_token`.
    ///
    /// Drops the cache entry and revokes the stored refresh token. Returns
    /// the user id that was logged out.
    pub async fn logout(&self, access_token: Option<&str>) -> Result<String, AuthError> {
        let token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;
        let claims = self.codec.verify(token, TokenKind::Access).map_err(|e| {
            debug!(reason = %e, "logout with unusable access token");
            AuthError::Unauthenticated
        })?;
        let user_id = claims.identity.id;

        self.cache.delete(&user_id).await?;
        self.store.clear_refresh_token(&user_id).await?;

        info!(%user_id, "user logged out");
        Ok(user_id)
    }

    /// Reload `user_id` from the store and overwrite its cache entry.
    ///
    /// Features that mutate a user call this so the next cache hit is fresh.
    pub async fn refresh_identity(&self, user_id: &str) -> Result<Option<Identity>, AuthError> {
        match self.store.find_by_id(user_id).await? {
            Some(identity) => {
                self.write_through(&identity).await?;
                Ok(Some(identity))
            }
            None => {
                self.cache.delete(user_id).await?;
                Ok(None)
            }
        }
    }

    /// Drop the cache entry for `user_id`.
    pub async fn invalidate(&self, user_id: &str) -> Result<(), AuthError> {
        self.cache.delete(user_id).await
    }
}

/// Email shape accepted at log-in.
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

static EMAIL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(EMAIL_PATTERN).ok());

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}
