//! State handlers.
//!
//! Get, conditional get, set, delete, and compare-and-swap update over
//! `(app, key) -> value`. Every handler resolves the application, then
//! consults [`AccessControl`], then (for writes) checks the size limit, and
//! only then touches the store. A rejected request never mutates state.
//!
//! # Invariants
//!
//! - `update` succeeds iff the stored value's content hash equals
//!   `expected`; otherwise the stored value is unchanged
//! - `update` never creates an entry
//! - `set` is last-write-wins with no version check

use std::sync::Arc;

use appstate_proto::{Access, AppKey, ContentHash, Identity, ProtocolError};
use bytes::Bytes;

use crate::{
    access::AccessControl,
    registry::ApplicationRegistry,
    storage::{Application, CasOutcome, StoredEntry, Store},
};

/// Handlers for state entry commands.
pub struct StateStore<S: Store> {
    registry: Arc<ApplicationRegistry<S>>,
    store: Arc<S>,
    access: Arc<AccessControl>,
    max_value_size: usize,
}

impl<S: Store> StateStore<S> {
    /// Create handlers sharing `store` and `access` with `registry`.
    pub fn new(
        registry: Arc<ApplicationRegistry<S>>,
        store: Arc<S>,
        access: Arc<AccessControl>,
        max_value_size: usize,
    ) -> Self {
        Self { registry, store, access, max_value_size }
    }

    /// Configured per-entry size limit.
    pub fn max_value_size(&self) -> usize {
        self.max_value_size
    }

    /// Read the value under `key`.
    pub fn get(&self, app: AppKey, key: &str, actor: &Identity) -> Result<Bytes, ProtocolError> {
        let app = self.readable(app, actor)?;
        self.load(&app, key).map(|entry| entry.value)
    }

    /// Read the value under `key` unless its hash equals `known`.
    ///
    /// Returns `None` when the caller's copy is current.
    pub fn get_if_changed(
        &self,
        app: AppKey,
        key: &str,
        actor: &Identity,
        known: &ContentHash,
    ) -> Result<Option<Bytes>, ProtocolError> {
        let app = self.readable(app, actor)?;
        let entry = self.load(&app, key)?;

        if entry.version() == *known {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    /// Create or overwrite the value under `key`.
    pub fn set(
        &self,
        app: AppKey,
        key: &str,
        actor: &Identity,
        value: Bytes,
    ) -> Result<(), ProtocolError> {
        let app = self.writable(app, actor)?;
        self.check_size(&value)?;

        let size = value.len();
        self.store.put_entry(app.key, key, StoredEntry { value, last_writer: actor.clone() })?;

        tracing::debug!(app = %app.key, key, size, writer = %actor, "set");
        Ok(())
    }

    /// Remove the value under `key`.
    pub fn delete(&self, app: AppKey, key: &str, actor: &Identity) -> Result<(), ProtocolError> {
        let app = self.writable(app, actor)?;

        if !self.store.remove_entry(app.key, key)? {
            return Err(ProtocolError::KeyNotFound { key: key.to_string() });
        }

        tracing::debug!(app = %app.key, key, writer = %actor, "delete");
        Ok(())
    }

    /// Replace the value under `key` iff its content hash equals `expected`.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if no value exists; update never creates one.
    /// - `VersionMismatch` if the stored value changed since the caller read
    ///   it.
    pub fn update(
        &self,
        app: AppKey,
        key: &str,
        actor: &Identity,
        expected: &ContentHash,
        value: Bytes,
    ) -> Result<(), ProtocolError> {
        let app = self.writable(app, actor)?;
        self.check_size(&value)?;

        let entry = StoredEntry { value, last_writer: actor.clone() };
        match self.store.compare_and_swap(app.key, key, expected, entry)? {
            CasOutcome::Swapped => {
                tracing::debug!(app = %app.key, key, writer = %actor, "update");
                Ok(())
            },
            CasOutcome::Missing => Err(ProtocolError::KeyNotFound { key: key.to_string() }),
            CasOutcome::Mismatch { current } => {
                tracing::debug!(app = %app.key, key, %expected, %current, "update lost race");
                Err(ProtocolError::VersionMismatch { key: key.to_string() })
            },
        }
    }

    fn readable(&self, key: AppKey, actor: &Identity) -> Result<Application, ProtocolError> {
        let app = self.registry.resolve(key)?;
        if !self.access.can_read(self.store.as_ref(), &app, actor)? {
            return Err(ProtocolError::PermissionDenied { access: Access::Read });
        }
        Ok(app)
    }

    fn writable(&self, key: AppKey, actor: &Identity) -> Result<Application, ProtocolError> {
        let app = self.registry.resolve(key)?;
        if !self.access.can_write(self.store.as_ref(), &app, actor)? {
            return Err(ProtocolError::PermissionDenied { access: Access::Write });
        }
        Ok(app)
    }

    fn check_size(&self, value: &Bytes) -> Result<(), ProtocolError> {
        if value.len() > self.max_value_size {
            return Err(ProtocolError::SizeLimitExceeded {
                size: value.len(),
                limit: self.max_value_size,
            });
        }
        Ok(())
    }

    fn load(&self, app: &Application, key: &str) -> Result<StoredEntry, ProtocolError> {
        self.store
            .entry(app.key, key)?
            .ok_or_else(|| ProtocolError::KeyNotFound { key: key.to_string() })
    }
}

impl<S: Store> std::fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("max_value_size", &self.max_value_size).finish()
    }
}
