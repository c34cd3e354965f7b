//! The shared, subject-scoped token cache
//!
//! Two slots exist per subject: a short-lived access slot holding the token
//! pair currently in use, and a long-lived refresh slot holding the pair
//! whose refresh token may be exchanged next. All cross-request coordination
//! in the token subsystem is delegated to this cache: concurrent misses for
//! one key coalesce into a single populating computation, so a user whose
//! access slot just expired triggers exactly one refresh exchange no matter
//! how many of their requests race.
//!
//! Keys are subject-scoped, so no two subjects' operations can block one
//! another. A caller cancelled while its populating computation is in flight
//! does not poison the slot; a surviving waiter re-runs the factory.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;

use crate::tokens::TokenResult;
use crate::{SubjectId, SubjectIdRef};

/// The two cache slots maintained per subject
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenSlot {
    /// The currently usable token pair; regenerated on miss via a refresh
    /// exchange
    Access,
    /// The token pair whose refresh token is eligible for exchange; written
    /// only on sign-in or rotation, never synthesized on a miss
    Refresh,
}

/// A subject-scoped cache key
///
/// Renders as `{sub}-token` for the access slot and `{sub}-refresh` for the
/// refresh slot, matching the key scheme used in logs and by the original
/// deployment's distributed cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    subject: SubjectId,
    slot: TokenSlot,
}

impl CacheKey {
    /// The access-slot key for a subject
    pub fn access(subject: SubjectId) -> Self {
        Self {
            subject,
            slot: TokenSlot::Access,
        }
    }

    /// The refresh-slot key for a subject
    pub fn refresh(subject: SubjectId) -> Self {
        Self {
            subject,
            slot: TokenSlot::Refresh,
        }
    }

    /// The subject this key is scoped to
    pub fn subject(&self) -> &SubjectIdRef {
        &self.subject
    }

    /// Which of the subject's two slots this key addresses
    pub fn slot(&self) -> TokenSlot {
        self.slot
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.slot {
            TokenSlot::Access => write!(f, "{}-token", self.subject),
            TokenSlot::Refresh => write!(f, "{}-refresh", self.subject),
        }
    }
}

#[derive(Clone)]
struct Entry {
    result: TokenResult,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<CacheKey, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    // an overwrite restarts the clock; `set` is last-write-wins
    fn expire_after_update(
        &self,
        _key: &CacheKey,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// The process-wide token store, shared across concurrent requests
///
/// Every entry carries its own time to live, supplied at write time. Reads
/// via [`peek`][TokenCache::peek] never populate a slot; population happens
/// only through [`get_or_create`][TokenCache::get_or_create] or
/// [`set`][TokenCache::set].
#[derive(Clone)]
pub struct TokenCache {
    inner: moka::future::Cache<CacheKey, Entry>,
}

impl TokenCache {
    /// Constructs an empty cache
    pub fn new() -> Self {
        Self {
            inner: moka::future::Cache::builder().expire_after(EntryTtl).build(),
        }
    }

    /// Returns the cached result for `key`, running `factory` on a miss
    ///
    /// Concurrent misses for the same key coalesce into a single factory
    /// invocation; callers that arrive while a factory run is in flight
    /// await its outcome instead of starting their own. A factory error is
    /// shared with every waiter and caches nothing, so the next miss tries
    /// again.
    pub async fn get_or_create<F, E>(
        &self,
        key: CacheKey,
        ttl: Duration,
        factory: F,
    ) -> Result<TokenResult, Arc<E>>
    where
        F: Future<Output = Result<TokenResult, E>>,
        E: Send + Sync + 'static,
    {
        self.inner
            .try_get_with(key, async move {
                factory.await.map(|result| Entry { result, ttl })
            })
            .await
            .map(|entry| entry.result)
    }

    /// Reads a slot without populating it
    ///
    /// A miss leaves the slot absent. The refresh slot is read exclusively
    /// through this method: its contents are provider-authoritative and must
    /// never be synthesized from nothing.
    pub async fn peek(&self, key: &CacheKey) -> Option<TokenResult> {
        self.inner.get(key).await.map(|entry| entry.result)
    }

    /// Unconditionally writes `result` under `key`
    ///
    /// Last write wins, including over the result of any in-flight factory
    /// run for the same key.
    pub async fn set(&self, key: CacheKey, result: TokenResult, ttl: Duration) {
        self.inner.insert(key, Entry { result, ttl }).await;
    }

    /// Unconditionally deletes `key`; idempotent
    pub async fn remove(&self, key: &CacheKey) {
        self.inner.invalidate(key).await;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}
