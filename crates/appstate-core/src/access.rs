//! Access Control
//!
//! Evaluates read/write permission for a caller against an application's
//! configured modes and its membership sets.
//!
//! | mode              | permitted iff                                       |
//! |-------------------|-----------------------------------------------------|
//! | `ANY`             | always                                              |
//! | `ADMIN_ONLY`      | actor is the application admin                      |
//! | `AUTHORIZED_ONLY` | actor is on the authorized list                     |
//! | `UNBANNED_ONLY`   | actor is authenticated and not on the banned list   |
//!
//! ## Caching
//!
//! Decisions for the membership-dependent modes are cached in an LRU keyed
//! by `(app, actor, access)`. Membership mutations call
//! [`AccessControl::invalidate`] before reporting success, so a just-revoked
//! user is never served a stale grant. Misses are computed while holding the
//! cache lock: a decision computed before a membership write is either
//! inserted before that write's invalidation (and removed by it) or computed
//! after it.

use std::{num::NonZeroUsize, sync::Mutex};

use appstate_proto::{Access, AccessMode, AppKey, CacheStats, Identity, MemberList};
use lru::LruCache;

use crate::storage::{Application, StorageError, Store};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    app: AppKey,
    actor: Identity,
    access: Access,
}

struct DecisionCache {
    entries: Option<LruCache<DecisionKey, bool>>,
    hits: u64,
    misses: u64,
}

/// Permission gate consulted by every state handler.
pub struct AccessControl {
    cache: Mutex<DecisionCache>,
}

impl AccessControl {
    /// Create an engine caching up to `capacity` decisions (zero disables
    /// caching).
    pub fn new(capacity: usize) -> Self {
        let entries = NonZeroUsize::new(capacity).map(LruCache::new);
        Self { cache: Mutex::new(DecisionCache { entries, hits: 0, misses: 0 }) }
    }

    /// Whether `actor` may read `app`'s state.
    pub fn can_read(
        &self,
        store: &impl Store,
        app: &Application,
        actor: &Identity,
    ) -> Result<bool, StorageError> {
        self.check(store, app, app.read_mode, actor, Access::Read)
    }

    /// Whether `actor` may write `app`'s state.
    pub fn can_write(
        &self,
        store: &impl Store,
        app: &Application,
        actor: &Identity,
    ) -> Result<bool, StorageError> {
        self.check(store, app, app.write_mode, actor, Access::Write)
    }

    /// Drop cached decisions for `actor` on `app`.
    ///
    /// Must be called after every membership change for that pair and
    /// before the change is reported as successful.
    pub fn invalidate(&self, app: AppKey, actor: &Identity) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(entries) = cache.entries.as_mut() {
            for access in [Access::Read, Access::Write] {
                entries.pop(&DecisionKey { app, actor: actor.clone(), access });
            }
        }
        Ok(())
    }

    /// Drop every cached decision for `app`.
    pub fn forget_app(&self, app: AppKey) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(entries) = cache.entries.as_mut() {
            let stale: Vec<DecisionKey> =
                entries.iter().filter(|(key, _)| key.app == app).map(|(key, _)| key.clone()).collect();
            for key in stale {
                entries.pop(&key);
            }
        }
        Ok(())
    }

    /// Cache counters.
    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let cache = self.cache.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            entries: cache.entries.as_ref().map_or(0, |e| e.len() as u64),
        })
    }

    fn check(
        &self,
        store: &impl Store,
        app: &Application,
        mode: AccessMode,
        actor: &Identity,
        access: Access,
    ) -> Result<bool, StorageError> {
        // Membership-independent modes are cheaper to evaluate than to cache
        if matches!(mode, AccessMode::Any | AccessMode::AdminOnly) {
            return evaluate(store, app, mode, actor);
        }

        let mut cache = self.cache.lock().map_err(|_| StorageError::LockPoisoned)?;
        let key = DecisionKey { app: app.key, actor: actor.clone(), access };

        let cached = cache.entries.as_mut().and_then(|e| e.get(&key).copied());
        if let Some(allowed) = cached {
            cache.hits += 1;
            return Ok(allowed);
        }

        cache.misses += 1;
        let allowed = evaluate(store, app, mode, actor)?;
        if let Some(entries) = cache.entries.as_mut() {
            entries.put(key, allowed);
        }
        Ok(allowed)
    }
}

impl std::fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControl").field("stats", &self.stats().ok()).finish()
    }
}

/// Evaluate `mode` for `actor` directly from membership state, uncached.
pub fn evaluate(
    store: &impl Store,
    app: &Application,
    mode: AccessMode,
    actor: &Identity,
) -> Result<bool, StorageError> {
    match mode {
        AccessMode::Any => Ok(true),
        AccessMode::AdminOnly => Ok(*actor == app.admin),
        AccessMode::AuthorizedOnly => store.is_member(app.key, MemberList::Authorized, actor),
        AccessMode::UnbannedOnly => {
            // No identity to check against the ban list
            if !actor.is_authenticated() {
                return Ok(false);
            }
            Ok(!store.is_member(app.key, MemberList::Banned, actor)?)
        },
    }
}
