//! Password hashing, bearer tokens and the session lifecycle.
//!
//! Tokens are random 32-byte values handed to the client once; only their
//! SHA-256 hex digest is stored. A short-lived moka cache sits in front of
//! session lookups so every authenticated request does not hit the store.

use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{LoginResponse, Session, TokenPersistence, User};
use crate::store::Store;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};

/// How long a validated session is trusted without re-reading the store.
const SESSION_CACHE_TTL_SECS: u64 = 60;
const SESSION_CACHE_CAPACITY: u64 = 10_000;

/// Hashes a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("Failed to hash password: {}", e)))
}

/// Checks a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Hash checked when a login names an unknown email, so that path costs
/// the same argon2 work as a wrong password.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    DUMMY_HASH
        .get_or_init(|| hash_password("no-such-account").ok())
        .as_deref()
}

fn blocking_task_failed(e: tokio::task::JoinError) -> AppError {
    AppError::InternalError(format!("Password task failed: {}", e))
}

/// `hash_password` on the blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(blocking_task_failed)?
}

/// Verifies a login password on the blocking pool.
///
/// With no stored hash the password is checked against a dummy hash and
/// the result is always `false`.
pub async fn check_credentials(
    password: String,
    stored_hash: Option<String>,
) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            if let Some(dummy) = dummy_hash() {
                let _ = verify_password(&password, dummy);
            }
            false
        }
    })
    .await
    .map_err(blocking_task_failed)
}

/// Generates a random bearer token (64 hex chars).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    hex::encode(bytes)
}

/// SHA-256 hex digest of a token; the only form that is persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lifetime of a session for the chosen persistence.
pub fn session_ttl(config: &Config, persistence: TokenPersistence) -> Duration {
    match persistence {
        TokenPersistence::Local => Duration::days(config.remember_me_ttl_days),
        TokenPersistence::Session => Duration::hours(config.session_ttl_hours),
    }
}

/// Cache of validated sessions: token hash -> (user, expiry).
#[derive(Clone)]
pub struct SessionCache {
    inner: Cache<String, (User, DateTime<Utc>)>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(std::time::Duration::from_secs(SESSION_CACHE_TTL_SECS))
                .max_capacity(SESSION_CACHE_CAPACITY)
                .build(),
        }
    }

    async fn get(&self, token_hash: &str, now: DateTime<Utc>) -> Option<User> {
        match self.inner.get(token_hash).await {
            Some((user, expires_at)) if expires_at > now => Some(user),
            Some(_) => {
                self.inner.invalidate(token_hash).await;
                None
            }
            None => None,
        }
    }

    async fn insert(&self, token_hash: String, user: User, expires_at: DateTime<Utc>) {
        self.inner.insert(token_hash, (user, expires_at)).await;
    }

    pub async fn invalidate(&self, token_hash: &str) {
        self.inner.invalidate(token_hash).await;
    }
}

/// Creates a session for `user` and returns the login payload with the raw token.
pub async fn issue_session(
    store: &Store,
    config: &Config,
    user: User,
    remember_me: bool,
) -> Result<LoginResponse, AppError> {
    let persistence = TokenPersistence::from_remember_me(remember_me);
    let now = Utc::now();
    let expires_at = now + session_ttl(config, persistence);
    let token = generate_token();

    store
        .create_session(Session {
            token_hash: hash_token(&token),
            user_id: user.id,
            persistence,
            created_at: now,
            expires_at,
        })
        .await?;

    tracing::info!(
        "Session issued for user {} ({} persistence, expires {})",
        user.id,
        persistence.as_str(),
        expires_at
    );

    Ok(LoginResponse {
        token,
        expires_at,
        persistence,
        user,
    })
}

/// Resolves a bearer token to its user.
///
/// Unknown tokens yield `None`; expired sessions are deleted and yield `None`.
pub async fn resolve_session(
    store: &Store,
    cache: &SessionCache,
    token: &str,
) -> Result<Option<User>, AppError> {
    let token_hash = hash_token(token);
    let now = Utc::now();

    if let Some(user) = cache.get(&token_hash, now).await {
        return Ok(Some(user));
    }

    let Some(session) = store.find_session(&token_hash).await? else {
        return Ok(None);
    };

    if session.is_expired(now) {
        tracing::debug!("Session for user {} expired, removing", session.user_id);
        store.delete_session(&token_hash).await?;
        return Ok(None);
    }

    let Some(record) = store.find_user(session.user_id).await? else {
        store.delete_session(&token_hash).await?;
        return Ok(None);
    };

    let user = record.public();
    cache
        .insert(token_hash, user.clone(), session.expires_at)
        .await;
    Ok(Some(user))
}

/// Ends the session behind `token`.
pub async fn end_session(store: &Store, cache: &SessionCache, token: &str) -> Result<(), AppError> {
    let token_hash = hash_token(token);
    cache.invalidate(&token_hash).await;
    store.delete_session(&token_hash).await
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticated user extracted from the `Authorization: Bearer` header.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?
            .to_string();

        let user = resolve_session(&state.store, &state.sessions, &token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(Self { user, token })
    }
}

/// Rejects non-admin callers with 403.
pub fn require_admin(auth: &AuthUser) -> Result<(), AppError> {
    if auth.user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "User {} is not an admin",
            auth.user.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store::NewUser;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_check_credentials_off_the_runtime() {
        let hash = hash_password_blocking("correct horse".to_string())
            .await
            .unwrap();
        let check = |password: &str, stored: Option<&str>| {
            check_credentials(password.to_string(), stored.map(str::to_string))
        };
        assert!(check("correct horse", Some(hash.as_str())).await.unwrap());
        assert!(!check("wrong horse", Some(hash.as_str())).await.unwrap());
        assert!(!check("correct horse", None).await.unwrap());
        assert!(!check("no-such-account", None).await.unwrap());
    }

    #[test]
    fn test_unknown_email_still_pays_for_a_hash_check() {
        let dummy = dummy_hash().unwrap();
        assert!(PasswordHash::new(dummy).is_ok());
        assert!(dummy.starts_with("$argon2id$"));
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), a);
        assert_eq!(hash_token(&a), hash_token(&a));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_remember_me_gets_longer_ttl() {
        let config = Config::default();
        assert_eq!(
            session_ttl(&config, TokenPersistence::Local),
            Duration::days(30)
        );
        assert_eq!(
            session_ttl(&config, TokenPersistence::Session),
            Duration::hours(12)
        );
    }

    async fn store_with_user() -> (Store, User) {
        let store = Store::Memory(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                name: "Lin".to_string(),
                email: "lin@crm.io".to_string(),
                password_hash: "unused".to_string(),
                role: None,
            })
            .await
            .unwrap()
            .public();
        (store, user)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (store, user) = store_with_user().await;
        let cache = SessionCache::new();
        let login = issue_session(&store, &Config::default(), user.clone(), true)
            .await
            .unwrap();
        assert_eq!(login.persistence, TokenPersistence::Local);

        let resolved = resolve_session(&store, &cache, &login.token).await.unwrap();
        assert_eq!(resolved, Some(user));

        end_session(&store, &cache, &login.token).await.unwrap();
        assert_eq!(
            resolve_session(&store, &cache, &login.token).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let (store, user) = store_with_user().await;
        let token = generate_token();
        let now = Utc::now();
        store
            .create_session(Session {
                token_hash: hash_token(&token),
                user_id: user.id,
                persistence: TokenPersistence::Session,
                created_at: now - Duration::hours(13),
                expires_at: now - Duration::hours(1),
            })
            .await
            .unwrap();

        let resolved = resolve_session(&store, &SessionCache::new(), &token)
            .await
            .unwrap();
        assert_eq!(resolved, None);
        assert!(store.find_session(&hash_token(&token)).await.unwrap().is_none());
    }
}
