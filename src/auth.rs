//! Credential checks for the query-serving layer
//!
//! Token verification itself lives outside this crate, behind
//! `CredentialVerifier`. This module memoizes verified identities for a
//! bounded window and answers scope checks. The ingestion pipeline never
//! consults it.

use crate::error::{Result, TrailError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Permission that passes every scope check
pub const ADMIN_PERMISSION: &str = "admin";

/// How long a verified identity is reused by default
pub const DEFAULT_IDENTITY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A verified caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,

    pub email: String,

    /// Granted permissions, including the caller's own `user/<id>` scope
    pub permissions: Vec<String>,
}

impl Identity {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Resolves a bearer token to an identity
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Key-value cache for verified identities
#[async_trait]
pub trait CredentialCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Identity>>;

    async fn set(&self, key: &str, identity: &Identity, ttl: Duration) -> Result<()>;
}

/// In-process identity cache with per-entry expiry
///
/// Expired entries are swept on every `set`, so the map holds at most the
/// identities verified within one TTL window.
#[derive(Default)]
pub struct MemoryCredentialCache {
    entries: RwLock<HashMap<String, (Identity, Instant)>>,
}

impl MemoryCredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        before - entries.len()
    }
}

#[async_trait]
impl CredentialCache for MemoryCredentialCache {
    async fn get(&self, key: &str) -> Result<Option<Identity>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((identity, expires)) if *expires > Instant::now() => {
                    return Ok(Some(identity.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Re-check under the write lock; a concurrent set may have refreshed it
        let mut entries = self.entries.write().await;
        if let Some((identity, expires)) = entries.get(key) {
            if *expires > Instant::now() {
                return Ok(Some(identity.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, identity: &Identity, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (identity.clone(), now + ttl));
        Ok(())
    }
}

/// Verifier that consults the cache before the underlying verifier
pub struct CachedVerifier {
    verifier: Arc<dyn CredentialVerifier>,
    cache: Arc<dyn CredentialCache>,
    ttl: Duration,
}

impl CachedVerifier {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, cache: Arc<dyn CredentialCache>) -> Self {
        Self {
            verifier,
            cache,
            ttl: DEFAULT_IDENTITY_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl CredentialVerifier for CachedVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        if let Some(identity) = self.cache.get(token).await? {
            return Ok(identity);
        }

        let identity = self.verifier.verify(token).await?;
        if let Err(e) = self.cache.set(token, &identity, self.ttl).await {
            // Verified anyway; the next call re-verifies
            tracing::warn!(user_id = %identity.user_id, error = %e, "Failed to cache identity");
        }
        Ok(identity)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Result<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TrailError::Unauthorized("invalid access token".to_string()))?;
    Ok(token)
}

/// Return the caller's user id if any of `scopes` is granted
///
/// Admins and scope-less checks always pass.
pub fn check_scopes<'a>(identity: &'a Identity, scopes: &[&str]) -> Result<&'a str> {
    if identity.user_id.is_empty() {
        return Err(TrailError::Unauthorized("no verified user".to_string()));
    }

    if identity.has_permission(ADMIN_PERMISSION)
        || scopes.is_empty()
        || scopes.iter().any(|s| identity.has_permission(s))
    {
        return Ok(&identity.user_id);
    }

    Err(TrailError::Unauthorized(
        "you don't have permission to access this resource".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialVerifier for CountingVerifier {
        async fn verify(&self, token: &str) -> Result<Identity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "bad" {
                return Err(TrailError::Unauthorized("could not verify bearer token".into()));
            }
            Ok(identity(&["user/u-1"]))
        }
    }

    fn identity(permissions: &[&str]) -> Identity {
        Identity {
            user_id: "u-1".to_string(),
            email: "kilgore@kilgore.trout".to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap(), "abc.def");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("Bearer ").is_err());
        assert!(bearer_token("").is_err());
    }

    #[test]
    fn test_check_scopes() {
        let admin = identity(&[ADMIN_PERMISSION]);
        assert_eq!(check_scopes(&admin, &["trails/read"]).unwrap(), "u-1");

        let reader = identity(&["trails/read"]);
        assert!(check_scopes(&reader, &["metrics/read", "trails/read"]).is_ok());
        assert!(check_scopes(&reader, &[]).is_ok());
        assert!(matches!(
            check_scopes(&reader, &["metrics/read"]),
            Err(TrailError::Unauthorized(_))
        ));

        let anonymous = Identity {
            user_id: String::new(),
            email: String::new(),
            permissions: vec![ADMIN_PERMISSION.to_string()],
        };
        assert!(check_scopes(&anonymous, &[]).is_err());
    }

    #[tokio::test]
    async fn test_cached_verifier_memoizes() {
        let inner = Arc::new(CountingVerifier { calls: AtomicUsize::new(0) });
        let cache = Arc::new(MemoryCredentialCache::new());
        let verifier = CachedVerifier::new(inner.clone(), cache.clone());

        let first = verifier.verify("good").await.unwrap();
        let second = verifier.verify("good").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_verification_is_not_cached() {
        let inner = Arc::new(CountingVerifier { calls: AtomicUsize::new(0) });
        let cache = Arc::new(MemoryCredentialCache::new());
        let verifier = CachedVerifier::new(inner.clone(), cache.clone());

        assert!(verifier.verify("bad").await.is_err());
        assert!(verifier.verify("bad").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let inner = Arc::new(CountingVerifier { calls: AtomicUsize::new(0) });
        let cache = Arc::new(MemoryCredentialCache::new());
        let verifier = CachedVerifier::new(inner.clone(), cache.clone())
            .with_ttl(Duration::from_secs(60));

        verifier.verify("good").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("good").await.unwrap().is_none());

        verifier.verify("good").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_reclaims_expired_entries() {
        let cache = MemoryCredentialCache::new();
        let who = identity(&[]);
        for i in 0..1000 {
            cache.set(&format!("token-{}", i), &who, Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(cache.len().await, 1000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        cache.set("fresh", &who, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert!(cache.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCredentialCache::new();
        let who = identity(&[]);
        cache.set("short", &who, Duration::from_secs(1)).await.unwrap();
        cache.set("long", &who, Duration::from_secs(120)).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("long").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_entry_survives_expired_lookup() {
        let cache = MemoryCredentialCache::new();
        let who = identity(&[]);
        cache.set("good", &who, Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        cache.set("good", &who, Duration::from_secs(60)).await.unwrap();
        assert!(cache.get("good").await.unwrap().is_some());
        assert_eq!(cache.len().await, 1);
    }
}
