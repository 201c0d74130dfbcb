//! Application Registry
//!
//! Creates, resolves, and deletes applications, and manages their
//! authorized/banned membership lists.
//!
//! ## Responsibilities
//!
//! - Registration: `app_id` is globally unique; the caller becomes admin
//! - Resolution: `app_id` → handle (`lookup`), handle → record (`resolve`)
//! - Deletion: admin only, cascades to entries and membership lists
//! - Membership: admin only; every successful change invalidates the cached
//!   permission decisions for the affected user before returning

use std::sync::Arc;

use appstate_proto::{Access, AccessMode, AppKey, Identity, MemberList, ProtocolError};

use crate::{
    access::AccessControl,
    env::Environment,
    storage::{Application, InsertOutcome, Store},
};

/// Handle draws before registration gives up on finding a free handle.
const MAX_HANDLE_ATTEMPTS: usize = 8;

/// Registry of applications and their membership lists.
pub struct ApplicationRegistry<S: Store> {
    store: Arc<S>,
    access: Arc<AccessControl>,
}

impl<S: Store> ApplicationRegistry<S> {
    /// Create a registry over `store`, invalidating decisions in `access`.
    pub fn new(store: Arc<S>, access: Arc<AccessControl>) -> Self {
        Self { store, access }
    }

    /// Register `app_id` with `caller` as admin.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailure` if the caller is anonymous.
    /// - `DuplicateApplication` if `app_id` is already registered.
    pub fn register<E: Environment>(
        &self,
        app_id: &str,
        caller: &Identity,
        read_mode: AccessMode,
        write_mode: AccessMode,
        env: &E,
    ) -> Result<AppKey, ProtocolError> {
        if !caller.is_authenticated() {
            return Err(ProtocolError::AuthenticationFailure);
        }

        for _ in 0..MAX_HANDLE_ATTEMPTS {
            let app = Application {
                key: AppKey::new(env.random_u128()),
                app_id: app_id.to_string(),
                admin: caller.clone(),
                read_mode,
                write_mode,
            };
            let key = app.key;

            match self.store.insert_application(app)? {
                InsertOutcome::Inserted => {
                    tracing::info!(
                        app_id,
                        app = %key,
                        admin = %caller,
                        %read_mode,
                        %write_mode,
                        "registered application"
                    );
                    return Ok(key);
                },
                InsertOutcome::DuplicateId => {
                    return Err(ProtocolError::DuplicateApplication { app_id: app_id.to_string() });
                },
                InsertOutcome::DuplicateKey => {
                    tracing::warn!(app = %key, "application handle collision, redrawing");
                },
            }
        }

        Err(ProtocolError::Internal { reason: "could not allocate application handle".into() })
    }

    /// Resolve an `app_id`.
    pub fn lookup(&self, app_id: &str) -> Result<Application, ProtocolError> {
        self.store
            .find_application(app_id)?
            .ok_or_else(|| ProtocolError::UnknownApplication { app: app_id.to_string() })
    }

    /// Resolve a handle.
    pub fn resolve(&self, key: AppKey) -> Result<Application, ProtocolError> {
        self.store
            .application(key)?
            .ok_or_else(|| ProtocolError::UnknownApplication { app: key.to_string() })
    }

    /// Delete an application and everything it owns.
    ///
    /// # Errors
    ///
    /// - `UnknownApplication` if the handle does not resolve.
    /// - `PermissionDenied` unless `caller` is the admin.
    pub fn delete(&self, key: AppKey, caller: &Identity) -> Result<(), ProtocolError> {
        let app = self.require_admin(key, caller)?;

        if self.store.remove_application(key)?.is_none() {
            // Lost a race with another delete
            return Err(ProtocolError::UnknownApplication { app: key.to_string() });
        }
        self.access.forget_app(key)?;

        tracing::info!(app_id = %app.app_id, app = %key, "deleted application");
        Ok(())
    }

    /// Add `user` to the authorized list.
    pub fn authorize(&self, key: AppKey, caller: &Identity, user: &str) -> Result<(), ProtocolError> {
        self.add_member(key, caller, MemberList::Authorized, user)
    }

    /// Remove `user` from the authorized list.
    pub fn unauthorize(
        &self,
        key: AppKey,
        caller: &Identity,
        user: &str,
    ) -> Result<(), ProtocolError> {
        self.remove_member(key, caller, MemberList::Authorized, user)
    }

    /// Add `user` to the banned list.
    pub fn ban(&self, key: AppKey, caller: &Identity, user: &str) -> Result<(), ProtocolError> {
        self.add_member(key, caller, MemberList::Banned, user)
    }

    /// Remove `user` from the banned list.
    pub fn unban(&self, key: AppKey, caller: &Identity, user: &str) -> Result<(), ProtocolError> {
        self.remove_member(key, caller, MemberList::Banned, user)
    }

    /// Whether `user` is on `list` for the application.
    pub fn is_member(&self, key: AppKey, list: MemberList, user: &str) -> Result<bool, ProtocolError> {
        Ok(self.store.is_member(key, list, &Identity::user(user))?)
    }

    fn add_member(
        &self,
        key: AppKey,
        caller: &Identity,
        list: MemberList,
        user: &str,
    ) -> Result<(), ProtocolError> {
        self.require_admin(key, caller)?;
        let target = Identity::user(user);

        if !self.store.add_member(key, list, &target)? {
            return Err(ProtocolError::DuplicateMembership { user: user.to_string(), list });
        }
        self.access.invalidate(key, &target)?;

        tracing::info!(app = %key, user, %list, "added member");
        Ok(())
    }

    fn remove_member(
        &self,
        key: AppKey,
        caller: &Identity,
        list: MemberList,
        user: &str,
    ) -> Result<(), ProtocolError> {
        self.require_admin(key, caller)?;
        let target = Identity::user(user);

        if !self.store.remove_member(key, list, &target)? {
            return Err(ProtocolError::NotAMember { user: user.to_string(), list });
        }
        self.access.invalidate(key, &target)?;

        tracing::info!(app = %key, user, %list, "removed member");
        Ok(())
    }

    fn require_admin(&self, key: AppKey, caller: &Identity) -> Result<Application, ProtocolError> {
        let app = self.resolve(key)?;
        if *caller != app.admin {
            return Err(ProtocolError::PermissionDenied { access: Access::Administer });
        }
        Ok(app)
    }
}

impl<S: Store> std::fmt::Debug for ApplicationRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::{Duration, Instant},
    };

    use super::*;
    use crate::storage::{MemoryStore, StoredEntry};

    /// Hands out handles from a counter; `repeat` draws repeat the first one.
    #[derive(Clone)]
    struct CountingEnv {
        next: Arc<AtomicU64>,
    }

    impl CountingEnv {
        fn new() -> Self {
            Self { next: Arc::new(AtomicU64::new(1)) }
        }
    }

    impl Environment for CountingEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, _duration: Duration) {}

        fn random_bytes(&self, buffer: &mut [u8]) {
            let value = self.next.fetch_add(1, Ordering::SeqCst);
            buffer.fill(0);
            let bytes = value.to_be_bytes();
            let len = buffer.len();
            let start = len.saturating_sub(bytes.len());
            buffer[start..].copy_from_slice(&bytes[bytes.len() - (len - start)..]);
        }
    }

    fn registry() -> (ApplicationRegistry<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let access = Arc::new(AccessControl::new(64));
        (ApplicationRegistry::new(Arc::clone(&store), access), store)
    }

    fn u1() -> Identity {
        Identity::user("U1")
    }

    #[test]
    fn register_and_lookup() {
        let (registry, _) = registry();
        let env = CountingEnv::new();

        let key = registry.register("demo", &u1(), AccessMode::Any, AccessMode::AdminOnly, &env).unwrap();
        let app = registry.lookup("demo").unwrap();

        assert_eq!(app.key, key);
        assert_eq!(app.admin, u1());
        assert_eq!(app.read_mode, AccessMode::Any);
        assert_eq!(app.write_mode, AccessMode::AdminOnly);
        assert_eq!(registry.resolve(key).unwrap().app_id, "demo");
    }

    #[test]
    fn register_requires_authentication() {
        let (registry, _) = registry();
        let result = registry.register(
            "demo",
            &Identity::Anonymous,
            AccessMode::Any,
            AccessMode::Any,
            &CountingEnv::new(),
        );
        assert_eq!(result, Err(ProtocolError::AuthenticationFailure));
    }

    #[test]
    fn duplicate_app_id_rejected() {
        let (registry, _) = registry();
        let env = CountingEnv::new();

        registry.register("demo", &u1(), AccessMode::Any, AccessMode::Any, &env).unwrap();
        let again = registry.register("demo", &Identity::user("U2"), AccessMode::Any, AccessMode::Any, &env);

        assert_eq!(again, Err(ProtocolError::DuplicateApplication { app_id: "demo".into() }));
        assert_eq!(registry.lookup("demo").unwrap().admin, u1());
    }

    #[test]
    fn handle_collision_redraws() {
        let (registry, store) = registry();
        let env = CountingEnv::new();

        // Occupy the first handle the env will produce
        store
            .insert_application(Application {
                key: AppKey::new(1),
                app_id: "squatter".into(),
                admin: u1(),
                read_mode: AccessMode::Any,
                write_mode: AccessMode::Any,
            })
            .unwrap();

        let key = registry.register("demo", &u1(), AccessMode::Any, AccessMode::Any, &env).unwrap();
        assert_eq!(key, AppKey::new(2));
    }

    #[test]
    fn lookup_unknown() {
        let (registry, _) = registry();
        assert_eq!(
            registry.lookup("nope").map(|a| a.key),
            Err(ProtocolError::UnknownApplication { app: "nope".into() })
        );
    }

    #[test]
    fn delete_requires_admin_and_cascades() {
        let (registry, store) = registry();
        let key = registry
            .register("demo", &u1(), AccessMode::Any, AccessMode::Any, &CountingEnv::new())
            .unwrap();
        store
            .put_entry(key, "score", StoredEntry { value: bytes::Bytes::from_static(b"1"), last_writer: u1() })
            .unwrap();
        registry.ban(key, &u1(), "U3").unwrap();

        assert_eq!(
            registry.delete(key, &Identity::user("U2")),
            Err(ProtocolError::PermissionDenied { access: Access::Administer })
        );

        registry.delete(key, &u1()).unwrap();
        assert!(matches!(registry.resolve(key), Err(ProtocolError::UnknownApplication { .. })));
        assert!(matches!(registry.lookup("demo"), Err(ProtocolError::UnknownApplication { .. })));
        assert_eq!(store.entry_count(key).unwrap(), 0);
        assert!(!store.is_member(key, MemberList::Banned, &Identity::user("U3")).unwrap());
    }

    #[test]
    fn app_id_reusable_after_delete() {
        let (registry, _) = registry();
        let env = CountingEnv::new();

        let first = registry.register("demo", &u1(), AccessMode::Any, AccessMode::Any, &env).unwrap();
        registry.delete(first, &u1()).unwrap();
        let second = registry.register("demo", &u1(), AccessMode::Any, AccessMode::Any, &env).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn membership_errors() {
        let (registry, _) = registry();
        let key = registry
            .register("demo", &u1(), AccessMode::AuthorizedOnly, AccessMode::UnbannedOnly, &CountingEnv::new())
            .unwrap();

        registry.authorize(key, &u1(), "U2").unwrap();
        assert!(registry.is_member(key, MemberList::Authorized, "U2").unwrap());
        assert_eq!(
            registry.authorize(key, &u1(), "U2"),
            Err(ProtocolError::DuplicateMembership { user: "U2".into(), list: MemberList::Authorized })
        );

        registry.unauthorize(key, &u1(), "U2").unwrap();
        assert_eq!(
            registry.unauthorize(key, &u1(), "U2"),
            Err(ProtocolError::NotAMember { user: "U2".into(), list: MemberList::Authorized })
        );

        assert_eq!(
            registry.unban(key, &u1(), "U3"),
            Err(ProtocolError::NotAMember { user: "U3".into(), list: MemberList::Banned })
        );
    }

    #[test]
    fn membership_requires_admin() {
        let (registry, _) = registry();
        let key = registry
            .register("demo", &u1(), AccessMode::Any, AccessMode::Any, &CountingEnv::new())
            .unwrap();

        for caller in [Identity::user("U2"), Identity::Anonymous] {
            assert_eq!(
                registry.ban(key, &caller, "U3"),
                Err(ProtocolError::PermissionDenied { access: Access::Administer })
            );
        }
        assert!(!registry.is_member(key, MemberList::Banned, "U3").unwrap());
    }
}
