use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::auth::cache::{IdentityCache, MemoryIdentityCache};
use crate::auth::jwt::{TokenCodec, TokenKind};
use crate::auth::password::hash_password;
use crate::auth::session::{Credentials, Resolution, SessionResolver};
use crate::auth::store::{MemoryUserStore, StoredUser, UserStore};
use crate::auth::{AuthError, AuthFailure};
use crate::models::auth::{Follow, Identity, IdentityClaim, UserCredentials, UserSummary};

/// Store wrapper that counts reads and writes.
#[derive(Default)]
struct CountingStore {
    inner: MemoryUserStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for CountingStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, AuthError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(id).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<UserSummary>, AuthError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_refresh_token(token).await
    }

    async fn set_refresh_token(&self, id: &str, token: &str) -> Result<Identity, AuthError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_refresh_token(id, token).await
    }

    async fn clear_refresh_token(&self, id: &str) -> Result<(), AuthError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_refresh_token(id).await
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_credentials_by_email(email).await
    }
}

/// Cache wrapper that counts every call.
#[derive(Default)]
struct CountingCache {
    inner: MemoryIdentityCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl CountingCache {
    fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityCache for CountingCache {
    async fn get(&self, user_id: &str) -> Result<Option<String>, AuthError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(user_id).await
    }

    async fn set(&self, user_id: &str, snapshot: String) -> Result<(), AuthError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(user_id, snapshot).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), AuthError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(user_id).await
    }
}

/// Store whose every call fails, standing in for an unreachable database.
struct DownStore;

#[async_trait]
impl UserStore for DownStore {
    async fn find_by_id(&self, _id: &str) -> Result<Option<Identity>, AuthError> {
        Err(AuthError::Internal("connection refused".into()))
    }

    async fn find_by_refresh_token(&self, _token: &str) -> Result<Option<UserSummary>, AuthError> {
        Err(AuthError::Internal("connection refused".into()))
    }

    async fn set_refresh_token(&self, _id: &str, _token: &str) -> Result<Identity, AuthError> {
        Err(AuthError::Internal("connection refused".into()))
    }

    async fn clear_refresh_token(&self, _id: &str) -> Result<(), AuthError> {
        Err(AuthError::Internal("connection refused".into()))
    }

    async fn find_credentials_by_email(
        &self,
        _email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        Err(AuthError::Internal("connection refused".into()))
    }
}

struct Harness {
    store: Arc<CountingStore>,
    cache: Arc<CountingCache>,
    codec: TokenCodec,
    resolver: SessionResolver,
}

fn ann_identity() -> Identity {
    let now = Utc::now();
    Identity {
        id: "U".into(),
        name: "Ann".into(),
        email: Some("ann@example.com".into()),
        bio: Some("quiz enjoyer".into()),
        image_url: None,
        is_private: false,
        is_author: false,
        is_admin: false,
        followers_count: 0,
        following_count: 1,
        saved_count: 0,
        created_at: now,
        updated_at: now,
        saved_quizes: Vec::new(),
        following: vec![Follow {
            id: "f1".into(),
            user_id: "U".into(),
            author_id: "A".into(),
            created_at: now,
        }],
        extra: Default::default(),
    }
}

fn ann_claim() -> IdentityClaim {
    IdentityClaim {
        id: "U".into(),
        name: "Ann".into(),
        email: None,
    }
}

fn harness() -> Harness {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(CountingCache::default());
    let codec = TokenCodec::new("access-secret", "refresh-secret");
    let resolver = SessionResolver::new(store.clone(), cache.clone(), codec.clone());
    Harness {
        store,
        cache,
        codec,
        resolver,
    }
}

impl Harness {
    /// Seed Ann with a valid stored refresh token and return that token.
    fn seed_ann(&self) -> String {
        let refresh = self.codec.sign(&ann_claim(), TokenKind::Refresh).unwrap();
        self.store.inner.insert(StoredUser {
            identity: ann_identity(),
            password_hash: Some(hash_password("correct horse").unwrap()),
            refresh_token: Some(refresh.clone()),
        });
        refresh
    }

    fn access_token(&self) -> String {
        self.codec.sign(&ann_claim(), TokenKind::Access).unwrap()
    }
}

fn access_only(token: String) -> Credentials {
    Credentials::new(Some(token), None)
}

fn refresh_only(token: String) -> Credentials {
    Credentials::new(None, Some(token))
}

#[tokio::test]
async fn no_tokens_touch_nothing() {
    let h = harness();
    h.seed_ann();

    let resolution = h.resolver.resolve(&Credentials::default()).await;

    assert!(!resolution.is_authenticated());
    assert_eq!(h.store.reads() + h.store.writes(), 0);
    assert_eq!(h.cache.calls(), 0);
}

#[tokio::test]
async fn empty_cookie_values_count_as_absent() {
    let h = harness();
    let creds = Credentials::new(Some(String::new()), Some(String::new()));
    assert_eq!(
        h.resolver.try_resolve(&creds).await.unwrap_err(),
        AuthFailure::NoCredentials
    );
}

#[tokio::test]
async fn cache_hit_returns_snapshot_without_store_calls() {
    let h = harness();
    h.seed_ann();
    let snapshot = ann_identity();
    h.cache
        .inner
        .set("U", serde_json::to_string(&snapshot).unwrap())
        .await
        .unwrap();

    let session = h
        .resolver
        .resolve(&access_only(h.access_token()))
        .await
        .into_session()
        .unwrap();

    assert_eq!(session.identity, snapshot);
    assert!(session.issued.is_none());
    assert_eq!(h.store.reads() + h.store.writes(), 0);
}

#[tokio::test]
async fn cache_hit_keeps_fields_written_by_other_features() {
    let h = harness();
    h.seed_ann();
    let mut raw = serde_json::to_value(ann_identity()).unwrap();
    raw["likes_count"] = serde_json::json!(7);
    raw["badges"] = serde_json::json!(["early-bird"]);
    h.cache.inner.set("U", raw.to_string()).await.unwrap();

    let session = h
        .resolver
        .resolve(&access_only(h.access_token()))
        .await
        .into_session()
        .unwrap();

    assert_eq!(serde_json::to_value(&session.identity).unwrap(), raw);
    assert_eq!(h.store.reads(), 0);
}

#[tokio::test]
async fn cold_cache_reads_store_once_and_writes_cache_once() {
    let h = harness();
    h.seed_ann();

    let session = h
        .resolver
        .resolve(&access_only(h.access_token()))
        .await
        .into_session()
        .unwrap();

    assert_eq!(session.identity.id, "U");
    assert_eq!(h.store.reads(), 1);
    assert_eq!(h.store.writes(), 0);
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 1);

    let cached = h.cache.inner.get("U").await.unwrap().unwrap();
    let cached: Identity = serde_json::from_str(&cached).unwrap();
    assert_eq!(cached, session.identity);
}

#[tokio::test]
async fn access_token_wins_over_refresh_token() {
    let h = harness();
    let refresh = h.seed_ann();

    let creds = Credentials::new(Some(h.access_token()), Some(refresh.clone()));
    let session = h.resolver.resolve(&creds).await.into_session().unwrap();

    assert!(session.issued.is_none());
    assert_eq!(h.store.writes(), 0);
    assert_eq!(h.store.inner.refresh_token_of("U"), Some(refresh));
}

#[tokio::test]
async fn expired_access_token_never_rotates() {
    let h = harness();
    let refresh = h.seed_ann();
    let expired = h
        .codec
        .sign_with_ttl(&ann_claim(), TokenKind::Access, Duration::hours(-1))
        .unwrap();

    let creds = Credentials::new(Some(expired), Some(refresh.clone()));
    assert_eq!(
        h.resolver.try_resolve(&creds).await.unwrap_err(),
        AuthFailure::TokenExpired
    );
    assert_eq!(h.store.reads() + h.store.writes(), 0);
    assert_eq!(h.store.inner.refresh_token_of("U"), Some(refresh));
}

#[tokio::test]
async fn forged_access_token_is_rejected() {
    let h = harness();
    h.seed_ann();
    let forged = TokenCodec::new("someone-else", "refresh-secret")
        .sign(&ann_claim(), TokenKind::Access)
        .unwrap();

    assert_eq!(
        h.resolver.try_resolve(&access_only(forged)).await.unwrap_err(),
        AuthFailure::InvalidSignature
    );
    assert!(
        !h.resolver
            .resolve(&access_only("garbage".into()))
            .await
            .is_authenticated()
    );
}

#[tokio::test]
async fn valid_token_for_deleted_user_is_unauthenticated() {
    let h = harness();
    h.seed_ann();
    h.store.inner.remove("U");

    assert_eq!(
        h.resolver
            .try_resolve(&access_only(h.access_token()))
            .await
            .unwrap_err(),
        AuthFailure::UserNotFound
    );
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rotation_issues_new_pair_and_caches_identity() {
    let h = harness();
    let refresh = h.seed_ann();

    let session = h
        .resolver
        .resolve(&refresh_only(refresh.clone()))
        .await
        .into_session()
        .unwrap();

    let issued = session.issued.expect("rotation issues tokens");
    assert_ne!(issued.refresh_token, refresh);
    assert_eq!(
        h.store.inner.refresh_token_of("U"),
        Some(issued.refresh_token.clone())
    );
    assert_eq!(h.store.reads(), 1);
    assert_eq!(h.store.writes(), 1);

    let access = h.codec.verify(&issued.access_token, TokenKind::Access).unwrap();
    assert_eq!(access.identity.id, "U");
    assert_eq!(access.identity.name, "Ann");
    assert_eq!(access.exp - access.iat, 3 * 60 * 60);
    let next = h
        .codec
        .verify(&issued.refresh_token, TokenKind::Refresh)
        .unwrap();
    assert_eq!(next.exp - next.iat, 7 * 24 * 60 * 60);

    let cached = h.cache.inner.get("U").await.unwrap().unwrap();
    assert!(!cached.contains("password"));
    assert!(!cached.contains("refresh_token"));
    let cached: Identity = serde_json::from_str(&cached).unwrap();
    assert_eq!(cached, session.identity);
    assert_eq!(session.identity.following.len(), 1);
}

#[tokio::test]
async fn rotated_refresh_token_cannot_be_replayed() {
    let h = harness();
    let old = h.seed_ann();

    let first = h.resolver.resolve(&refresh_only(old.clone())).await;
    assert!(first.is_authenticated());

    assert_eq!(
        h.resolver.try_resolve(&refresh_only(old)).await.unwrap_err(),
        AuthFailure::UserNotFound
    );
}

#[tokio::test]
async fn new_refresh_token_rotates_again() {
    let h = harness();
    let old = h.seed_ann();

    let issued = h
        .resolver
        .resolve(&refresh_only(old))
        .await
        .into_session()
        .and_then(|s| s.issued)
        .unwrap();

    let again = h.resolver.resolve(&refresh_only(issued.refresh_token)).await;
    assert!(again.is_authenticated());
}

#[tokio::test]
async fn expired_refresh_token_skips_store() {
    let h = harness();
    h.seed_ann();
    let expired = h
        .codec
        .sign_with_ttl(&ann_claim(), TokenKind::Refresh, Duration::hours(-1))
        .unwrap();

    assert_eq!(
        h.resolver.try_resolve(&refresh_only(expired)).await.unwrap_err(),
        AuthFailure::TokenExpired
    );
    assert_eq!(h.store.reads(), 0);
}

#[tokio::test]
async fn unknown_refresh_token_is_unauthenticated() {
    let h = harness();
    h.seed_ann();
    let stranger = h.codec.sign(&ann_claim(), TokenKind::Refresh).unwrap();

    let resolution = h.resolver.resolve(&refresh_only(stranger)).await;
    assert!(!resolution.is_authenticated());
    assert_eq!(h.store.writes(), 0);
    assert_eq!(h.cache.calls(), 0);
}

#[tokio::test]
async fn store_outage_degrades_to_unauthenticated() {
    let codec = TokenCodec::new("access-secret", "refresh-secret");
    let resolver = SessionResolver::new(
        Arc::new(DownStore),
        Arc::new(MemoryIdentityCache::new()),
        codec.clone(),
    );
    let access = codec.sign(&ann_claim(), TokenKind::Access).unwrap();
    let refresh = codec.sign(&ann_claim(), TokenKind::Refresh).unwrap();

    assert_eq!(
        resolver.try_resolve(&access_only(access)).await.unwrap_err(),
        AuthFailure::BackingStoreFailure
    );
    assert!(matches!(
        resolver.resolve(&refresh_only(refresh)).await,
        Resolution::Unauthenticated
    ));
}

#[tokio::test]
async fn poisoned_snapshot_is_sanitized_on_read() {
    let h = harness();
    h.seed_ann();
    let mut raw = serde_json::to_value(ann_identity()).unwrap();
    raw["password"] = serde_json::json!("$2b$10$leaked");
    raw["refresh_token"] = serde_json::json!("eyJleaked");
    h.cache.inner.set("U", raw.to_string()).await.unwrap();

    let session = h
        .resolver
        .resolve(&access_only(h.access_token()))
        .await
        .into_session()
        .unwrap();

    let encoded = serde_json::to_value(&session.identity).unwrap();
    assert!(encoded.get("password").is_none());
    assert!(encoded.get("refresh_token").is_none());
    assert_eq!(h.store.reads(), 0);
}

#[tokio::test]
async fn undecodable_snapshot_is_reloaded_from_store() {
    let h = harness();
    h.seed_ann();
    h.cache.inner.set("U", "{not json".into()).await.unwrap();

    let session = h
        .resolver
        .resolve(&access_only(h.access_token()))
        .await
        .into_session()
        .unwrap();

    assert_eq!(session.identity.id, "U");
    assert_eq!(h.store.reads(), 1);
    let repaired = h.cache.inner.get("U").await.unwrap().unwrap();
    assert!(serde_json::from_str::<Identity>(&repaired).is_ok());
}

#[tokio::test]
async fn login_starts_session_and_caches_identity() {
    let h = harness();
    let old = h.seed_ann();

    let session = h
        .resolver
        .login("ann@example.com", "correct horse")
        .await
        .unwrap();

    let issued = session.issued.unwrap();
    assert_eq!(
        h.store.inner.refresh_token_of("U"),
        Some(issued.refresh_token.clone())
    );
    assert_ne!(issued.refresh_token, old);
    assert!(h.cache.inner.get("U").await.unwrap().is_some());
}

#[tokio::test]
async fn login_does_not_reveal_which_credential_was_wrong() {
    let h = harness();
    h.seed_ann();

    let wrong_password = h.resolver.login("ann@example.com", "nope").await;
    let unknown_email = h.resolver.login("bob@example.com", "nope").await;

    assert!(matches!(wrong_password, Err(AuthError::CredentialError)));
    assert!(matches!(unknown_email, Err(AuthError::CredentialError)));
}

#[tokio::test]
async fn login_validates_input() {
    let h = harness();

    assert!(matches!(
        h.resolver.login("ann@example.com", "").await,
        Err(AuthError::ValidationError(_))
    ));
    for email in [
        "",
        "ann",
        "ann@",
        "ann@example",
        "a b@example.com",
        "ann@example.c",
        "ann!#<>@example.com",
        "a\"b@ex_ample.com",
        "ann@exa(mple).com",
    ] {
        assert!(
            matches!(
                h.resolver.login(email, "pw").await,
                Err(AuthError::ValidationError(_))
            ),
            "email: {email:?}"
        );
    }
    assert_eq!(h.store.reads(), 0);
}

#[tokio::test]
async fn logout_drops_cache_and_revokes_refresh_token() {
    let h = harness();
    let refresh = h.seed_ann();
    h.resolver.resolve(&access_only(h.access_token())).await;
    assert!(h.cache.inner.get("U").await.unwrap().is_some());

    let user_id = h.resolver.logout(Some(&h.access_token())).await.unwrap();

    assert_eq!(user_id, "U");
    assert!(h.cache.inner.get("U").await.unwrap().is_none());
    assert!(h.store.inner.refresh_token_of("U").is_none());
    assert!(
        !h.resolver
            .resolve(&refresh_only(refresh))
            .await
            .is_authenticated()
    );
}

#[tokio::test]
async fn logout_without_valid_access_token_is_unauthenticated() {
    let h = harness();
    h.seed_ann();

    assert!(matches!(
        h.resolver.logout(None).await,
        Err(AuthError::Unauthenticated)
    ));
    assert!(matches!(
        h.resolver.logout(Some("garbage")).await,
        Err(AuthError::Unauthenticated)
    ));
    assert_eq!(h.cache.calls(), 0);
}

#[tokio::test]
async fn refresh_identity_overwrites_stale_snapshot() {
    let h = harness();
    h.seed_ann();
    let mut stale = ann_identity();
    stale.name = "Old Ann".into();
    h.cache
        .inner
        .set("U", serde_json::to_string(&stale).unwrap())
        .await
        .unwrap();

    let fresh = h.resolver.refresh_identity("U").await.unwrap().unwrap();
    assert_eq!(fresh.name, "Ann");

    let session = h
        .resolver
        .resolve(&access_only(h.access_token()))
        .await
        .into_session()
        .unwrap();
    assert_eq!(session.identity.name, "Ann");
}

#[tokio::test]
async fn refresh_identity_for_missing_user_drops_entry() {
    let h = harness();
    h.cache.inner.set("ghost", "{}".into()).await.unwrap();

    assert!(h.resolver.refresh_identity("ghost").await.unwrap().is_none());
    assert!(h.cache.inner.get("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn invalidate_forces_next_resolution_to_read_store() {
    let h = harness();
    h.seed_ann();
    let access = h.access_token();
    h.resolver.resolve(&access_only(access.clone())).await;
    assert_eq!(h.store.reads(), 1);

    h.resolver.invalidate("U").await.unwrap();
    assert!(h.cache.inner.get("U").await.unwrap().is_none());

    let resolution = h.resolver.resolve(&access_only(access)).await;
    assert!(resolution.is_authenticated());
    assert_eq!(h.store.reads(), 2);
    assert!(h.cache.inner.get("U").await.unwrap().is_some());
}
