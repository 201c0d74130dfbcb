//! Storage abstraction.
//!
//! The `Store` trait is the boundary with the durable storage engine. The
//! protocol needs four things from it:
//!
//! - Application records, unique by `app_id`
//! - Authorized/banned membership sets per application
//! - A table of state entries keyed by `(app, key)` with get, unconditional
//!   put, and delete
//! - An atomic compare-and-swap on a single entry
//!
//! # Invariants
//!
//! - At most one entry per `(app, key)`; absence is distinct from an empty
//!   value
//! - `compare_and_swap` compares and replaces as one step: no other put,
//!   delete, or swap on the same `(app, key)` interleaves
//! - Removing an application removes its entries and membership sets, and no
//!   write racing the removal can leave an orphaned entry behind
//!
//! [`MemoryStore`] shards entries across independently locked maps so that
//! different keys are written in parallel.

use std::{
    collections::{HashMap, HashSet},
    hash::{BuildHasher, RandomState},
    sync::{Mutex, RwLock},
};

use appstate_proto::{AccessMode, AppKey, ContentHash, Identity, MemberList, ProtocolError};
use bytes::Bytes;

/// Errors from storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Write addressed an application that no longer exists.
    #[error("application {0} does not exist")]
    UnknownApplication(AppKey),

    /// Backend unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for ProtocolError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnknownApplication(key) => Self::UnknownApplication { app: key.to_string() },
            other => Self::Internal { reason: other.to_string() },
        }
    }
}

/// Registered application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    /// Opaque handle.
    pub key: AppKey,
    /// Unique human-chosen name.
    pub app_id: String,
    /// Identity that registered the application.
    pub admin: Identity,
    /// Who may read state.
    pub read_mode: AccessMode,
    /// Who may write state.
    pub write_mode: AccessMode,
}

/// Current value of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Serialized value.
    pub value: Bytes,
    /// Identity that last wrote the value.
    pub last_writer: Identity,
}

impl StoredEntry {
    /// Version stamp: the content hash of the value.
    pub fn version(&self) -> ContentHash {
        ContentHash::of(&self.value)
    }
}

/// Result of inserting an application record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Record stored.
    Inserted,
    /// Another application already uses the `app_id`.
    DuplicateId,
    /// Another application already uses the handle.
    DuplicateKey,
}

/// Result of a compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Value replaced.
    Swapped,
    /// No entry exists; compare-and-swap never creates one.
    Missing,
    /// Current value's hash differs from the expected one.
    Mismatch {
        /// Version currently stored.
        current: ContentHash,
    },
}

/// Durable storage for applications, membership, and state entries.
pub trait Store: Send + Sync {
    /// Insert an application record unless its `app_id` or handle is taken.
    fn insert_application(&self, app: Application) -> Result<InsertOutcome, StorageError>;

    /// Load an application by handle.
    fn application(&self, key: AppKey) -> Result<Option<Application>, StorageError>;

    /// Load an application by `app_id`.
    fn find_application(&self, app_id: &str) -> Result<Option<Application>, StorageError>;

    /// Remove an application with all of its entries and membership sets.
    ///
    /// Returns the removed record, or `None` if it did not exist.
    fn remove_application(&self, key: AppKey) -> Result<Option<Application>, StorageError>;

    /// Add `user` to a membership list. Returns false if already present.
    fn add_member(&self, key: AppKey, list: MemberList, user: &Identity) -> Result<bool, StorageError>;

    /// Remove `user` from a membership list. Returns false if absent.
    fn remove_member(
        &self,
        key: AppKey,
        list: MemberList,
        user: &Identity,
    ) -> Result<bool, StorageError>;

    /// Whether `user` is on a membership list.
    fn is_member(&self, key: AppKey, list: MemberList, user: &Identity) -> Result<bool, StorageError>;

    /// Load the entry stored under `(app, name)`.
    fn entry(&self, app: AppKey, name: &str) -> Result<Option<StoredEntry>, StorageError>;

    /// Create or overwrite the entry under `(app, name)`.
    fn put_entry(&self, app: AppKey, name: &str, entry: StoredEntry) -> Result<(), StorageError>;

    /// Remove the entry under `(app, name)`. Returns false if absent.
    fn remove_entry(&self, app: AppKey, name: &str) -> Result<bool, StorageError>;

    /// Atomically replace the entry iff its version equals `expected`.
    fn compare_and_swap(
        &self,
        app: AppKey,
        name: &str,
        expected: &ContentHash,
        entry: StoredEntry,
    ) -> Result<CasOutcome, StorageError>;

    /// Number of entries stored for an application.
    fn entry_count(&self, app: AppKey) -> Result<usize, StorageError>;
}

/// Default number of entry shards.
pub const DEFAULT_SHARDS: usize = 16;

#[derive(Default)]
struct Applications {
    by_key: HashMap<AppKey, Application>,
    by_id: HashMap<String, AppKey>,
    members: HashMap<(AppKey, MemberList), HashSet<Identity>>,
}

type Shard = HashMap<AppKey, HashMap<String, StoredEntry>>;

/// In-memory `Store`.
///
/// Lock order is always applications before shard, so removal of an
/// application (exclusive) cannot interleave with entry writes (shared).
pub struct MemoryStore {
    apps: RwLock<Applications>,
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
}

impl MemoryStore {
    /// Create an empty store with [`DEFAULT_SHARDS`] entry shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an empty store with `shards` entry shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        Self {
            apps: RwLock::new(Applications::default()),
            shards: (0..shards.max(1)).map(|_| Mutex::new(Shard::new())).collect(),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, app: AppKey, name: &str) -> &Mutex<Shard> {
        let index = self.hasher.hash_one((app, name)) as usize % self.shards.len();
        &self.shards[index]
    }

    /// Run `f` against the entry map of one `(app, name)` shard while holding
    /// a shared lock on the application table, after checking the
    /// application still exists.
    fn with_live_shard<T>(
        &self,
        app: AppKey,
        name: &str,
        f: impl FnOnce(&mut Shard) -> T,
    ) -> Result<T, StorageError> {
        let apps = self.apps.read().map_err(|_| StorageError::LockPoisoned)?;
        if !apps.by_key.contains_key(&app) {
            return Err(StorageError::UnknownApplication(app));
        }

        let mut shard = self.shard(app, name).lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&mut shard))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("shards", &self.shards.len()).finish_non_exhaustive()
    }
}

impl Store for MemoryStore {
    fn insert_application(&self, app: Application) -> Result<InsertOutcome, StorageError> {
        let mut apps = self.apps.write().map_err(|_| StorageError::LockPoisoned)?;

        if apps.by_id.contains_key(&app.app_id) {
            return Ok(InsertOutcome::DuplicateId);
        }
        if apps.by_key.contains_key(&app.key) {
            return Ok(InsertOutcome::DuplicateKey);
        }

        apps.by_id.insert(app.app_id.clone(), app.key);
        apps.by_key.insert(app.key, app);
        Ok(InsertOutcome::Inserted)
    }

    fn application(&self, key: AppKey) -> Result<Option<Application>, StorageError> {
        let apps = self.apps.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps.by_key.get(&key).cloned())
    }

    fn find_application(&self, app_id: &str) -> Result<Option<Application>, StorageError> {
        let apps = self.apps.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps.by_id.get(app_id).and_then(|key| apps.by_key.get(key)).cloned())
    }

    fn remove_application(&self, key: AppKey) -> Result<Option<Application>, StorageError> {
        let mut apps = self.apps.write().map_err(|_| StorageError::LockPoisoned)?;

        let Some(app) = apps.by_key.remove(&key) else {
            return Ok(None);
        };
        apps.by_id.remove(&app.app_id);
        apps.members.remove(&(key, MemberList::Authorized));
        apps.members.remove(&(key, MemberList::Banned));

        // Still holding the exclusive application lock: no entry write can
        // be in flight for this app.
        for shard in &self.shards {
            shard.lock().map_err(|_| StorageError::LockPoisoned)?.remove(&key);
        }

        Ok(Some(app))
    }

    fn add_member(&self, key: AppKey, list: MemberList, user: &Identity) -> Result<bool, StorageError> {
        let mut apps = self.apps.write().map_err(|_| StorageError::LockPoisoned)?;
        if !apps.by_key.contains_key(&key) {
            return Err(StorageError::UnknownApplication(key));
        }
        Ok(apps.members.entry((key, list)).or_default().insert(user.clone()))
    }

    fn remove_member(
        &self,
        key: AppKey,
        list: MemberList,
        user: &Identity,
    ) -> Result<bool, StorageError> {
        let mut apps = self.apps.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps.members.get_mut(&(key, list)).is_some_and(|set| set.remove(user)))
    }

    fn is_member(&self, key: AppKey, list: MemberList, user: &Identity) -> Result<bool, StorageError> {
        let apps = self.apps.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(apps.members.get(&(key, list)).is_some_and(|set| set.contains(user)))
    }

    fn entry(&self, app: AppKey, name: &str) -> Result<Option<StoredEntry>, StorageError> {
        let shard = self.shard(app, name).lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(shard.get(&app).and_then(|entries| entries.get(name)).cloned())
    }

    fn put_entry(&self, app: AppKey, name: &str, entry: StoredEntry) -> Result<(), StorageError> {
        self.with_live_shard(app, name, |shard| {
            shard.entry(app).or_default().insert(name.to_string(), entry);
        })
    }

    fn remove_entry(&self, app: AppKey, name: &str) -> Result<bool, StorageError> {
        self.with_live_shard(app, name, |shard| {
            let Some(entries) = shard.get_mut(&app) else {
                return false;
            };
            let removed = entries.remove(name).is_some();
            if entries.is_empty() {
                shard.remove(&app);
            }
            removed
        })
    }

    fn compare_and_swap(
        &self,
        app: AppKey,
        name: &str,
        expected: &ContentHash,
        entry: StoredEntry,
    ) -> Result<CasOutcome, StorageError> {
        self.with_live_shard(app, name, |shard| {
            let Some(current) = shard.get_mut(&app).and_then(|entries| entries.get_mut(name)) else {
                return CasOutcome::Missing;
            };

            let version = current.version();
            if version != *expected {
                return CasOutcome::Mismatch { current: version };
            }

            *current = entry;
            CasOutcome::Swapped
        })
    }

    fn entry_count(&self, app: AppKey) -> Result<usize, StorageError> {
        let mut count = 0;
        for shard in &self.shards {
            let shard = shard.lock().map_err(|_| StorageError::LockPoisoned)?;
            count += shard.get(&app).map_or(0, HashMap::len);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(raw: u128, app_id: &str) -> Application {
        Application {
            key: AppKey::new(raw),
            app_id: app_id.to_string(),
            admin: Identity::user("admin"),
            read_mode: AccessMode::Any,
            write_mode: AccessMode::Any,
        }
    }

    fn entry(value: &'static [u8]) -> StoredEntry {
        StoredEntry { value: Bytes::from_static(value), last_writer: Identity::user("admin") }
    }

    #[test]
    fn insert_rejects_duplicate_id_and_key() {
        let store = MemoryStore::new();
        assert_eq!(store.insert_application(app(1, "demo")), Ok(InsertOutcome::Inserted));
        assert_eq!(store.insert_application(app(2, "demo")), Ok(InsertOutcome::DuplicateId));
        assert_eq!(store.insert_application(app(1, "other")), Ok(InsertOutcome::DuplicateKey));
    }

    #[test]
    fn find_by_id_and_key() {
        let store = MemoryStore::new();
        store.insert_application(app(1, "demo")).expect("insert");

        assert_eq!(store.find_application("demo").expect("find").map(|a| a.key), Some(AppKey::new(1)));
        assert_eq!(store.application(AppKey::new(1)).expect("load").map(|a| a.app_id), Some("demo".to_string()));
        assert_eq!(store.find_application("missing").expect("find"), None);
    }

    #[test]
    fn empty_value_is_distinct_from_absent() {
        let store = MemoryStore::new();
        let key = AppKey::new(1);
        store.insert_application(app(1, "demo")).expect("insert");

        assert_eq!(store.entry(key, "k").expect("get"), None);
        store.put_entry(key, "k", entry(b"")).expect("put");
        assert_eq!(store.entry(key, "k").expect("get").map(|e| e.value.len()), Some(0));
    }

    #[test]
    fn cas_outcomes() {
        let store = MemoryStore::new();
        let key = AppKey::new(1);
        store.insert_application(app(1, "demo")).expect("insert");

        let missing = store.compare_and_swap(key, "k", &ContentHash::of(b"a"), entry(b"b"));
        assert_eq!(missing, Ok(CasOutcome::Missing));

        store.put_entry(key, "k", entry(b"a")).expect("put");
        let stale = store.compare_and_swap(key, "k", &ContentHash::of(b"x"), entry(b"b"));
        assert_eq!(stale, Ok(CasOutcome::Mismatch { current: ContentHash::of(b"a") }));

        let swapped = store.compare_and_swap(key, "k", &ContentHash::of(b"a"), entry(b"b"));
        assert_eq!(swapped, Ok(CasOutcome::Swapped));
        assert_eq!(store.entry(key, "k").expect("get"), Some(entry(b"b")));
    }

    #[test]
    fn writes_to_unknown_app_fail() {
        let store = MemoryStore::new();
        let result = store.put_entry(AppKey::new(9), "k", entry(b"v"));
        assert_eq!(result, Err(StorageError::UnknownApplication(AppKey::new(9))));
    }

    #[test]
    fn remove_application_cascades() {
        let store = MemoryStore::with_shards(4);
        let key = AppKey::new(1);
        store.insert_application(app(1, "demo")).expect("insert");
        store.insert_application(app(2, "other")).expect("insert");

        for name in ["a", "b", "c", "d", "e"] {
            store.put_entry(key, name, entry(b"v")).expect("put");
        }
        store.put_entry(AppKey::new(2), "a", entry(b"v")).expect("put");
        store.add_member(key, MemberList::Authorized, &Identity::user("U2")).expect("member");
        store.add_member(key, MemberList::Banned, &Identity::user("U3")).expect("member");
        assert_eq!(store.entry_count(key), Ok(5));

        let removed = store.remove_application(key).expect("remove");
        assert_eq!(removed.map(|a| a.app_id), Some("demo".to_string()));

        assert_eq!(store.entry_count(key), Ok(0));
        assert_eq!(store.find_application("demo"), Ok(None));
        assert_eq!(store.is_member(key, MemberList::Authorized, &Identity::user("U2")), Ok(false));
        assert_eq!(store.is_member(key, MemberList::Banned, &Identity::user("U3")), Ok(false));

        // Other applications are untouched
        assert_eq!(store.entry_count(AppKey::new(2)), Ok(1));
    }

    #[test]
    fn membership_set_semantics() {
        let store = MemoryStore::new();
        let key = AppKey::new(1);
        let user = Identity::user("U2");
        store.insert_application(app(1, "demo")).expect("insert");

        assert_eq!(store.add_member(key, MemberList::Authorized, &user), Ok(true));
        assert_eq!(store.add_member(key, MemberList::Authorized, &user), Ok(false));
        assert_eq!(store.is_member(key, MemberList::Banned, &user), Ok(false));
        assert_eq!(store.remove_member(key, MemberList::Authorized, &user), Ok(true));
        assert_eq!(store.remove_member(key, MemberList::Authorized, &user), Ok(false));
    }
}
