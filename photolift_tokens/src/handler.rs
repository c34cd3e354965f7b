//! The token lifecycle manager
//!
//! [`TokenHandler`] owns credential acquisition, caching, rotation, and
//! invalidation for the per-user bearer tokens used to call the wiki's REST
//! API. It keeps two cache slots per subject consistent: the one-hour access
//! slot serving reads, and the 28-day refresh slot holding the credential
//! eligible for the next exchange.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheKey, TokenCache};
use crate::principal::Principal;
use crate::refresh::{RefreshError, RefreshTokenClient};
use crate::tokens::{TokenResult, UserToken};
use crate::SubjectIdRef;

// provider-aligned slot lifetimes: access tokens live for an hour, refresh
// tokens for four weeks
const ACCESS_SLOT_TTL: Duration = Duration::from_secs(60 * 60);
const REFRESH_SLOT_TTL: Duration = Duration::from_secs(28 * 24 * 60 * 60);

/// Why a refresh flow ended without producing a usable token
#[derive(Debug, Error)]
enum FlowAbort {
    #[error("no refresh token cached for this subject")]
    NoRefreshToken,
    #[error("refresh token rejected; cached credentials purged")]
    Rejected(#[source] RefreshError),
    #[error("transient failure during refresh exchange")]
    Transient(#[source] RefreshError),
}

/// A transient upstream fault while refreshing a token
///
/// The only error [`TokenHandler::get_token`] surfaces. Cached state is left
/// untouched, so a retry on a later request can succeed once the provider
/// recovers. A missing credential and a revoked credential are not errors;
/// both surface as a denied [`TokenResult`].
#[derive(Clone, Debug, Error)]
#[error("unable to refresh the access token due to a transient upstream failure")]
pub struct TransientFailure {
    #[source]
    source: Arc<FlowAbort>,
}

/// Manages per-user token acquisition, caching, rotation, and invalidation
///
/// All operations are keyed by the subject claim of the caller's principal;
/// anonymous principals are served denied results without side effects.
/// Coordination between concurrent requests is delegated entirely to the
/// cache's single-flight semantics: for any subject, at most one refresh
/// exchange is in flight at a time, no matter how many requests race.
#[derive(Debug)]
pub struct TokenHandler<C> {
    client: C,
    cache: TokenCache,
}

impl<C> TokenHandler<C> {
    /// Constructs a handler around a refresh client and an empty cache
    pub fn new(client: C) -> Self {
        Self::with_cache(client, TokenCache::new())
    }

    /// Constructs a handler over an existing cache
    ///
    /// Hosts running several handler instances (one per deployment mode)
    /// point them at one shared store so every instance observes the same
    /// credential state.
    pub fn with_cache(client: C, cache: TokenCache) -> Self {
        Self { client, cache }
    }
}

impl<C: RefreshTokenClient> TokenHandler<C> {
    /// Returns the principal's current token, refreshing on a cache miss
    ///
    /// Concurrent calls for one subject share a single refresh exchange and
    /// all observe the same outcome: either the pre-refresh cached value or
    /// the single post-refresh value, never an interleaved partial write.
    pub async fn get_token(&self, principal: &Principal) -> Result<TokenResult, TransientFailure> {
        let Some(sub) = principal.subject() else {
            return Ok(TokenResult::denied());
        };

        let key = CacheKey::access(sub.to_owned());
        match self
            .cache
            .get_or_create(key, ACCESS_SLOT_TTL, self.refresh_flow(sub))
            .await
        {
            Ok(result) => Ok(result),
            Err(abort) if matches!(*abort, FlowAbort::Transient(_)) => {
                Err(TransientFailure { source: abort })
            }
            Err(_) => Ok(TokenResult::denied()),
        }
    }

    /// Stores a freshly issued token pair for the principal
    ///
    /// Called once per successful sign-in. Writes both slots
    /// unconditionally; last write wins over any in-flight refresh.
    pub async fn set_token(&self, principal: &Principal, token: UserToken) {
        let Some(sub) = principal.subject() else {
            return;
        };

        tracing::debug!(subject = %sub, "storing token pair for subject");

        let result = TokenResult::granted(token);
        self.cache
            .set(
                CacheKey::refresh(sub.to_owned()),
                result.clone(),
                REFRESH_SLOT_TTL,
            )
            .await;
        self.cache
            .set(CacheKey::access(sub.to_owned()), result, ACCESS_SLOT_TTL)
            .await;
    }

    /// Discards all cached credentials for the principal
    ///
    /// Idempotent. Both slots are always removed together; a dangling
    /// half-state never persists after removal.
    pub async fn remove_token(&self, principal: &Principal) {
        let Some(sub) = principal.subject() else {
            return;
        };

        self.purge(sub).await;
    }

    async fn purge(&self, sub: &SubjectIdRef) {
        tracing::debug!(subject = %sub, "purging cached credentials for subject");
        self.cache.remove(&CacheKey::access(sub.to_owned())).await;
        self.cache.remove(&CacheKey::refresh(sub.to_owned())).await;
    }

    /// The factory for the access slot: exchange the cached refresh token
    ///
    /// The refresh slot is read without populating; it is provider-
    /// authoritative and must never be synthesized from nothing. Aborts
    /// cache nothing, so a revoked credential leaves both slots absent and a
    /// transient fault leaves the refresh slot intact for the next attempt.
    async fn refresh_flow(&self, sub: &SubjectIdRef) -> Result<TokenResult, FlowAbort> {
        let refresh_key = CacheKey::refresh(sub.to_owned());

        let Some(cached) = self.cache.peek(&refresh_key).await else {
            tracing::debug!(subject = %sub, "no refresh token cached; treating caller as signed out");
            return Err(FlowAbort::NoRefreshToken);
        };
        let Some(prior) = cached.token() else {
            return Err(FlowAbort::NoRefreshToken);
        };

        match self.client.refresh(prior.refresh_token()).await {
            Ok(next) => {
                let result = TokenResult::granted(next);
                // the provider rotates refresh tokens; the pair just spent
                // must be replaced in the same flow
                self.cache
                    .set(refresh_key, result.clone(), REFRESH_SLOT_TTL)
                    .await;
                tracing::info!(subject = %sub, "rotated token pair for subject");
                Ok(result)
            }
            Err(error) if error.is_rejection() => {
                tracing::info!(subject = %sub, "refresh token rejected; signing subject out");
                self.purge(sub).await;
                Err(FlowAbort::Rejected(error))
            }
            Err(error) => Err(FlowAbort::Transient(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use aliri_clock::DurationSecs;
    use async_trait::async_trait;

    use super::*;
    use crate::{AccessToken, RefreshToken, RefreshTokenRef, SubjectId};

    fn token(tag: &str) -> UserToken {
        UserToken::new(
            "Bearer".to_owned(),
            DurationSecs(3600),
            AccessToken::from(format!("access-{tag}")),
            RefreshToken::from(format!("refresh-{tag}")),
        )
    }

    fn principal() -> Principal {
        Principal::authenticated(SubjectId::from_static("u1"))
    }

    fn sub() -> SubjectId {
        SubjectId::from_static("u1")
    }

    /// Issues a fixed token pair, recording every refresh token presented
    struct FixedClient {
        calls: AtomicUsize,
        presented: Mutex<Vec<RefreshToken>>,
        issue: UserToken,
    }

    impl FixedClient {
        fn issuing(issue: UserToken) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                presented: Mutex::new(Vec::new()),
                issue,
            }
        }
    }

    #[async_trait]
    impl RefreshTokenClient for FixedClient {
        async fn refresh(
            &self,
            refresh_token: &RefreshTokenRef,
        ) -> Result<UserToken, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.presented
                .lock()
                .unwrap()
                .push(refresh_token.to_owned());
            // hold the exchange open long enough for racing callers to queue
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.issue.clone())
        }
    }

    /// Rejects every exchange as permanently dead (provider 401)
    struct RejectingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RefreshTokenClient for RejectingClient {
        async fn refresh(&self, _: &RefreshTokenRef) -> Result<UserToken, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RefreshError::Rejected { status: 401 })
        }
    }

    /// Fails every exchange transiently (provider 503)
    struct UnavailableClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RefreshTokenClient for UnavailableClient {
        async fn refresh(&self, _: &RefreshTokenRef) -> Result<UserToken, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RefreshError::Other("authority returned 503".into()))
        }
    }

    #[tokio::test]
    async fn anonymous_principal_is_denied_without_side_effects() {
        let handler = TokenHandler::new(FixedClient::issuing(token("t1")));

        let result = handler.get_token(&Principal::anonymous()).await.unwrap();

        assert!(!result.is_success());
        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(handler.cache.peek(&CacheKey::access(sub())).await, None);
    }

    #[tokio::test]
    async fn unknown_subject_is_denied_without_a_network_call() {
        let handler = TokenHandler::new(FixedClient::issuing(token("t1")));

        let result = handler.get_token(&principal()).await.unwrap();

        assert!(!result.is_success());
        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_token_is_served_without_a_refresh() {
        let handler = TokenHandler::new(FixedClient::issuing(token("t2")));
        handler.set_token(&principal(), token("t1")).await;

        let result = handler.get_token(&principal()).await.unwrap();

        assert_eq!(result.token(), Some(&token("t1")));
        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_access_slot_triggers_refresh_and_rotation() {
        let handler = TokenHandler::new(FixedClient::issuing(token("t2")));
        let principal = principal();
        handler.set_token(&principal, token("t1")).await;

        // simulate the access slot expiring while the refresh slot survives
        handler.cache.remove(&CacheKey::access(sub())).await;

        let result = handler.get_token(&principal).await.unwrap();

        assert_eq!(result.token(), Some(&token("t2")));
        assert_eq!(
            handler.client.presented.lock().unwrap().as_slice(),
            [RefreshToken::from_static("refresh-t1")]
        );

        // both slots now hold the rotated pair; the old refresh token is gone
        assert_eq!(
            handler.cache.peek(&CacheKey::refresh(sub())).await,
            Some(TokenResult::granted(token("t2")))
        );
        assert_eq!(
            handler.cache.peek(&CacheKey::access(sub())).await,
            Some(TokenResult::granted(token("t2")))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_a_single_refresh() {
        let handler = Arc::new(TokenHandler::new(FixedClient::issuing(token("t2"))));
        let principal = principal();
        handler.set_token(&principal, token("t1")).await;
        handler.cache.remove(&CacheKey::access(sub())).await;

        let callers: Vec<_> = (0..16)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let principal = principal.clone();
                tokio::spawn(async move { handler.get_token(&principal).await })
            })
            .collect();

        for caller in callers {
            let result = caller.await.unwrap().unwrap();
            assert_eq!(result.token(), Some(&token("t2")));
        }

        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_purges_both_slots() {
        let handler = TokenHandler::new(RejectingClient {
            calls: AtomicUsize::new(0),
        });
        let principal = principal();
        handler.set_token(&principal, token("t1")).await;
        handler.cache.remove(&CacheKey::access(sub())).await;

        let result = handler.get_token(&principal).await.unwrap();

        assert!(!result.is_success());
        assert_eq!(handler.cache.peek(&CacheKey::access(sub())).await, None);
        assert_eq!(handler.cache.peek(&CacheKey::refresh(sub())).await, None);

        // nothing left to exchange, so the second call stays off the network
        let result = handler.get_token(&principal).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_propagates_and_preserves_the_refresh_slot() {
        let handler = TokenHandler::new(UnavailableClient {
            calls: AtomicUsize::new(0),
        });
        let principal = principal();
        handler.set_token(&principal, token("t1")).await;
        handler.cache.remove(&CacheKey::access(sub())).await;

        handler.get_token(&principal).await.unwrap_err();

        assert_eq!(
            handler.cache.peek(&CacheKey::refresh(sub())).await,
            Some(TokenResult::granted(token("t1")))
        );

        // the failure was not cached as a denial; the next call retries
        handler.get_token(&principal).await.unwrap_err();
        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remove_token_always_yields_denied_afterwards() {
        let handler = TokenHandler::new(FixedClient::issuing(token("t2")));
        let principal = principal();
        handler.set_token(&principal, token("t1")).await;

        handler.remove_token(&principal).await;
        handler.remove_token(&principal).await;

        let result = handler.get_token(&principal).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(handler.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sign_in_then_expiry_then_rotation() {
        let handler = TokenHandler::new(FixedClient::issuing(token("t2")));
        let principal = principal();

        let result = handler.get_token(&principal).await.unwrap();
        assert!(!result.is_success());

        handler.set_token(&principal, token("t1")).await;
        let result = handler.get_token(&principal).await.unwrap();
        assert_eq!(result.token(), Some(&token("t1")));

        handler.cache.remove(&CacheKey::access(sub())).await;
        let result = handler.get_token(&principal).await.unwrap();
        assert_eq!(result.token(), Some(&token("t2")));
        assert_eq!(
            handler.cache.peek(&CacheKey::refresh(sub())).await,
            Some(TokenResult::granted(token("t2")))
        );
    }
}
