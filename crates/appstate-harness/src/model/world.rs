//! Model world.
//!
//! Applications, membership, and entries kept in ordered maps, with every
//! rule written out directly. Check order per command matches the server:
//! resolve the application, check permission, check size, then touch state.

use std::collections::{BTreeMap, BTreeSet};

use appstate_proto::AccessMode;

use super::operation::{
    AppSlot, Caller, KeySlot, Operation, OperationError, OperationResult, SmallValue, key_name,
};

/// Value size limit the model enforces (and the real world must configure).
pub const MODEL_MAX_VALUE_SIZE: usize = 8;

/// Model application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelApp {
    /// Admin's caller index.
    pub admin: Caller,
    /// Read mode.
    pub read_mode: AccessMode,
    /// Write mode.
    pub write_mode: AccessMode,
    /// Authorized users.
    pub authorized: BTreeSet<u8>,
    /// Banned users.
    pub banned: BTreeSet<u8>,
    /// Entries by key name.
    pub entries: BTreeMap<String, Vec<u8>>,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Registered slots with their entries.
    pub apps: BTreeMap<AppSlot, BTreeMap<String, Vec<u8>>>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    users: u8,
    apps: BTreeMap<AppSlot, ModelApp>,
}

impl ModelWorld {
    /// World with `users` authenticated callers `0..users`; other caller
    /// indices are anonymous.
    pub fn new(users: u8) -> Self {
        Self { users, apps: BTreeMap::new() }
    }

    /// Number of authenticated users.
    pub fn users(&self) -> u8 {
        self.users
    }

    /// Application in `slot`, if registered.
    pub fn app(&self, slot: AppSlot) -> Option<&ModelApp> {
        self.apps.get(&slot)
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            apps: self.apps.iter().map(|(slot, app)| (*slot, app.entries.clone())).collect(),
        }
    }

    /// Target user index reduced to the user range.
    pub fn target(&self, target: u8) -> u8 {
        target % self.users.max(1)
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let caller = self.identity(op.caller());
        let slot = op.app();

        let result = match *op {
            Operation::Register { read_mode, write_mode, .. } => {
                self.register(slot, caller, read_mode.mode(), write_mode.mode())
            },
            Operation::DeleteApp { .. } => self.delete_app(slot, caller),
            Operation::Authorize { target, .. } => self.add_member(slot, caller, target, true),
            Operation::Unauthorize { target, .. } => self.remove_member(slot, caller, target, true),
            Operation::Ban { target, .. } => self.add_member(slot, caller, target, false),
            Operation::Unban { target, .. } => self.remove_member(slot, caller, target, false),
            Operation::Get { key, .. } => self
                .readable(slot, caller)
                .and_then(|app| Self::load(app, key))
                .map(OperationResult::Value),
            Operation::GetIfChanged { key, known, .. } => {
                self.readable(slot, caller).and_then(|app| Self::load(app, key)).map(|current| {
                    if current == known.to_bytes() {
                        OperationResult::Unchanged
                    } else {
                        OperationResult::Value(current)
                    }
                })
            },
            Operation::Set { key, value, .. } => self.set(slot, caller, key, value),
            Operation::Delete { key, .. } => self.delete(slot, caller, key),
            Operation::Update { key, expected, value, .. } => {
                self.update(slot, caller, key, expected, value)
            },
        };

        result.unwrap_or_else(OperationResult::Error)
    }

    fn identity(&self, caller: Caller) -> Option<Caller> {
        (caller < self.users).then_some(caller)
    }

    fn register(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
        read_mode: AccessMode,
        write_mode: AccessMode,
    ) -> Result<OperationResult, OperationError> {
        let admin = caller.ok_or(OperationError::AuthenticationFailure)?;
        if self.apps.contains_key(&slot) {
            return Err(OperationError::DuplicateApplication);
        }

        self.apps.insert(slot, ModelApp {
            admin,
            read_mode,
            write_mode,
            authorized: BTreeSet::new(),
            banned: BTreeSet::new(),
            entries: BTreeMap::new(),
        });
        Ok(OperationResult::Ok)
    }

    fn resolve(&self, slot: AppSlot) -> Result<&ModelApp, OperationError> {
        self.apps.get(&slot).ok_or(OperationError::UnknownApplication)
    }

    fn admin(&self, slot: AppSlot, caller: Option<Caller>) -> Result<&ModelApp, OperationError> {
        let app = self.resolve(slot)?;
        if caller != Some(app.admin) {
            return Err(OperationError::PermissionDenied);
        }
        Ok(app)
    }

    fn delete_app(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
    ) -> Result<OperationResult, OperationError> {
        self.admin(slot, caller)?;
        self.apps.remove(&slot);
        Ok(OperationResult::Ok)
    }

    fn add_member(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
        target: u8,
        authorized: bool,
    ) -> Result<OperationResult, OperationError> {
        self.admin(slot, caller)?;
        let target = self.target(target);
        let app = self.apps.get_mut(&slot).ok_or(OperationError::UnknownApplication)?;
        let list = if authorized { &mut app.authorized } else { &mut app.banned };

        if !list.insert(target) {
            return Err(OperationError::DuplicateMembership);
        }
        Ok(OperationResult::Ok)
    }

    fn remove_member(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
        target: u8,
        authorized: bool,
    ) -> Result<OperationResult, OperationError> {
        self.admin(slot, caller)?;
        let target = self.target(target);
        let app = self.apps.get_mut(&slot).ok_or(OperationError::UnknownApplication)?;
        let list = if authorized { &mut app.authorized } else { &mut app.banned };

        if !list.remove(&target) {
            return Err(OperationError::NotAMember);
        }
        Ok(OperationResult::Ok)
    }

    fn permitted(app: &ModelApp, mode: AccessMode, caller: Option<Caller>) -> bool {
        match (mode, caller) {
            (AccessMode::Any, _) => true,
            (AccessMode::AdminOnly, caller) => caller == Some(app.admin),
            (AccessMode::AuthorizedOnly, Some(user)) => app.authorized.contains(&user),
            (AccessMode::UnbannedOnly, Some(user)) => !app.banned.contains(&user),
            (AccessMode::AuthorizedOnly | AccessMode::UnbannedOnly, None) => false,
        }
    }

    fn readable(&self, slot: AppSlot, caller: Option<Caller>) -> Result<&ModelApp, OperationError> {
        let app = self.resolve(slot)?;
        if !Self::permitted(app, app.read_mode, caller) {
            return Err(OperationError::PermissionDenied);
        }
        Ok(app)
    }

    fn writable(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
    ) -> Result<&mut ModelApp, OperationError> {
        let app = self.apps.get_mut(&slot).ok_or(OperationError::UnknownApplication)?;
        if !Self::permitted(app, app.write_mode, caller) {
            return Err(OperationError::PermissionDenied);
        }
        Ok(app)
    }

    fn load(app: &ModelApp, key: KeySlot) -> Result<Vec<u8>, OperationError> {
        app.entries.get(&key_name(key)).cloned().ok_or(OperationError::KeyNotFound)
    }

    fn check_size(value: &[u8]) -> Result<(), OperationError> {
        if value.len() > MODEL_MAX_VALUE_SIZE {
            return Err(OperationError::SizeLimitExceeded);
        }
        Ok(())
    }

    fn set(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
        key: KeySlot,
        value: SmallValue,
    ) -> Result<OperationResult, OperationError> {
        let app = self.writable(slot, caller)?;
        let value = value.to_bytes();
        Self::check_size(&value)?;

        app.entries.insert(key_name(key), value);
        Ok(OperationResult::Ok)
    }

    fn delete(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
        key: KeySlot,
    ) -> Result<OperationResult, OperationError> {
        let app = self.writable(slot, caller)?;
        app.entries.remove(&key_name(key)).ok_or(OperationError::KeyNotFound)?;
        Ok(OperationResult::Ok)
    }

    fn update(
        &mut self,
        slot: AppSlot,
        caller: Option<Caller>,
        key: KeySlot,
        expected: SmallValue,
        value: SmallValue,
    ) -> Result<OperationResult, OperationError> {
        let app = self.writable(slot, caller)?;
        let value = value.to_bytes();
        Self::check_size(&value)?;

        let current = app.entries.get_mut(&key_name(key)).ok_or(OperationError::KeyNotFound)?;
        if *current != expected.to_bytes() {
            return Err(OperationError::VersionMismatch);
        }
        *current = value;
        Ok(OperationResult::Ok)
    }
}
