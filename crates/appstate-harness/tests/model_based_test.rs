//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! dispatcher behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (Dispatcher)   Results
//! ```

use std::{collections::HashMap, sync::Arc};

use appstate_core::{CoreConfig, Dispatcher, MemoryStore, StaticIdentityProvider, Store};
use appstate_harness::{
    AppSlot, ModelMode, ModelWorld, Operation, OperationError, OperationResult, SimEnv,
    SmallValue,
    model::{APP_SLOTS, app_name, key_name},
};
use appstate_proto::{AppKey, AuthToken, Command, ContentHash, Reply, Request};
use bytes::Bytes;
use proptest::prelude::*;

/// Real system wrapper that mirrors ModelWorld's interface.
struct RealWorld {
    dispatcher: Dispatcher<MemoryStore, SimEnv>,
    store: Arc<MemoryStore>,
    users: u8,
    /// Handles returned by registration, by slot
    handles: HashMap<AppSlot, AppKey>,
}

impl RealWorld {
    fn new(users: u8, seed: u64) -> Self {
        let identity: StaticIdentityProvider =
            (0..users).map(|i| (format!("token-{i}"), format!("U{i}"))).collect();
        let config = CoreConfig {
            max_value_size: appstate_harness::MODEL_MAX_VALUE_SIZE,
            ..CoreConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let dispatcher =
            Dispatcher::new(Arc::clone(&store), config, Arc::new(identity), SimEnv::with_seed(seed));

        Self { dispatcher, store, users, handles: HashMap::new() }
    }

    fn request(&self, caller: u8, command: Command) -> Request {
        if caller < self.users {
            Request::authenticated(AuthToken::new(format!("token-{caller}")), command)
        } else {
            Request::anonymous(command)
        }
    }

    fn handle(&self, slot: AppSlot) -> AppKey {
        // Unregistered slots get a handle no registration will produce
        self.handles.get(&slot).copied().unwrap_or(AppKey::new(0))
    }

    fn target(&self, target: u8) -> String {
        format!("U{}", target % self.users.max(1))
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        let slot = op.app();
        let app = self.handle(slot);

        let command = match *op {
            Operation::Register { read_mode, write_mode, .. } => Command::RegisterApp {
                app_id: app_name(slot),
                read_mode: read_mode.mode(),
                write_mode: write_mode.mode(),
            },
            Operation::DeleteApp { .. } => Command::DeleteApp { app },
            Operation::Authorize { target, .. } => Command::Authorize { app, user: self.target(target) },
            Operation::Unauthorize { target, .. } => {
                Command::Unauthorize { app, user: self.target(target) }
            },
            Operation::Ban { target, .. } => Command::Ban { app, user: self.target(target) },
            Operation::Unban { target, .. } => Command::Unban { app, user: self.target(target) },
            Operation::Get { key, .. } => Command::Get { app, key: key_name(key) },
            Operation::GetIfChanged { key, known, .. } => Command::GetIfChanged {
                app,
                key: key_name(key),
                known: ContentHash::of(&known.to_bytes()),
            },
            Operation::Set { key, value, .. } => {
                Command::Set { app, key: key_name(key), value: Bytes::from(value.to_bytes()) }
            },
            Operation::Delete { key, .. } => Command::Delete { app, key: key_name(key) },
            Operation::Update { key, expected, value, .. } => Command::Update {
                app,
                key: key_name(key),
                expected: ContentHash::of(&expected.to_bytes()),
                value: Bytes::from(value.to_bytes()),
            },
        };

        let response = self.dispatcher.handle(self.request(op.caller(), command));
        match (op, response) {
            (Operation::Register { .. }, Ok(Reply::AppKey(key))) => {
                self.handles.insert(slot, key);
                OperationResult::Ok
            },
            (Operation::DeleteApp { .. }, Ok(Reply::Ok)) => {
                self.handles.remove(&slot);
                OperationResult::Ok
            },
            (_, Ok(Reply::Ok)) => OperationResult::Ok,
            (_, Ok(Reply::Value(value))) => OperationResult::Value(value.to_vec()),
            (_, Ok(Reply::Unchanged)) => OperationResult::Unchanged,
            (_, Ok(other)) => panic!("unexpected reply {other:?} to {op:?}"),
            (_, Err(err)) => OperationResult::Error(OperationError::from(&err)),
        }
    }

    fn entry_count(&self, slot: AppSlot) -> usize {
        self.handles.get(&slot).map_or(0, |key| self.store.entry_count(*key).unwrap())
    }
}

/// Strategy for generating operations over `users` users plus one anonymous
/// caller.
fn operation_strategy(users: u8) -> impl Strategy<Value = Operation> {
    let caller = 0..=users;
    let app = 0..APP_SLOTS;
    let key = any::<u8>();
    let target = any::<u8>();
    let mode = any::<u8>().prop_map(ModelMode);
    let value = any::<u8>().prop_map(SmallValue);

    prop_oneof![
        2 => (caller.clone(), app.clone(), mode.clone(), mode).prop_map(
            |(caller, app, read_mode, write_mode)| Operation::Register { caller, app, read_mode, write_mode }
        ),
        1 => (caller.clone(), app.clone()).prop_map(|(caller, app)| Operation::DeleteApp { caller, app }),
        1 => (caller.clone(), app.clone(), target.clone())
            .prop_map(|(caller, app, target)| Operation::Authorize { caller, app, target }),
        1 => (caller.clone(), app.clone(), target.clone())
            .prop_map(|(caller, app, target)| Operation::Unauthorize { caller, app, target }),
        1 => (caller.clone(), app.clone(), target.clone())
            .prop_map(|(caller, app, target)| Operation::Ban { caller, app, target }),
        1 => (caller.clone(), app.clone(), target)
            .prop_map(|(caller, app, target)| Operation::Unban { caller, app, target }),
        3 => (caller.clone(), app.clone(), key.clone())
            .prop_map(|(caller, app, key)| Operation::Get { caller, app, key }),
        2 => (caller.clone(), app.clone(), key.clone(), value.clone())
            .prop_map(|(caller, app, key, known)| Operation::GetIfChanged { caller, app, key, known }),
        4 => (caller.clone(), app.clone(), key.clone(), value.clone())
            .prop_map(|(caller, app, key, value)| Operation::Set { caller, app, key, value }),
        1 => (caller.clone(), app.clone(), key.clone())
            .prop_map(|(caller, app, key)| Operation::Delete { caller, app, key }),
        4 => (caller, app, key, value.clone(), value).prop_map(
            |(caller, app, key, expected, value)| Operation::Update { caller, app, key, expected, value }
        ),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every operation returns the same result in the model and the
    /// dispatcher, and stored state agrees afterwards.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        users in 1..4u8,
        ops in prop::collection::vec(operation_strategy(3), 0..80)
    ) {
        let mut model = ModelWorld::new(users);
        let mut real = RealWorld::new(users, seed);

        for (i, op) in ops.iter().enumerate() {
            let op = clamp_caller(op.clone(), users);

            let model_result = model.apply(&op);
            let real_result = real.apply(&op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i,
                op
            );
        }

        let state = model.observable_state();
        for slot in 0..APP_SLOTS {
            let expected = state.apps.get(&slot).map_or(0, |entries| entries.len());
            prop_assert_eq!(expected, real.entry_count(slot), "entry count of slot {}", slot);
        }
    }

    /// Under `Any`/`Any` every write is admitted and update succeeds exactly
    /// when the expected value equals the stored one.
    #[test]
    fn prop_open_app_cas(
        writes in prop::collection::vec((any::<u8>(), any::<u8>()), 1..30)
    ) {
        let mut model = ModelWorld::new(2);
        let register = Operation::Register { caller: 0, app: 0, read_mode: ModelMode(0), write_mode: ModelMode(0) };
        prop_assert!(model.apply(&register).is_ok());
        model.apply(&Operation::Set { caller: 1, app: 0, key: 0, value: SmallValue(0) });

        for (expected, value) in writes {
            let current = model.observable_state().apps[&0]["key-0"].clone();
            let expected = SmallValue(expected);
            let value = SmallValue(value);

            let result = model.apply(&Operation::Update { caller: 2, app: 0, key: 0, expected, value });
            if value.to_bytes().len() > appstate_harness::MODEL_MAX_VALUE_SIZE {
                prop_assert_eq!(result, OperationResult::Error(OperationError::SizeLimitExceeded));
            } else if expected.to_bytes() == current {
                prop_assert_eq!(result, OperationResult::Ok);
            } else {
                prop_assert_eq!(result, OperationResult::Error(OperationError::VersionMismatch));
            }
        }
    }
}

/// Anonymous callers are represented by a single index, `users`.
fn clamp_caller(op: Operation, users: u8) -> Operation {
    let clamp = |caller: u8| caller.min(users);
    match op {
        Operation::Register { caller, app, read_mode, write_mode } => {
            Operation::Register { caller: clamp(caller), app, read_mode, write_mode }
        },
        Operation::DeleteApp { caller, app } => Operation::DeleteApp { caller: clamp(caller), app },
        Operation::Authorize { caller, app, target } => {
            Operation::Authorize { caller: clamp(caller), app, target }
        },
        Operation::Unauthorize { caller, app, target } => {
            Operation::Unauthorize { caller: clamp(caller), app, target }
        },
        Operation::Ban { caller, app, target } => Operation::Ban { caller: clamp(caller), app, target },
        Operation::Unban { caller, app, target } => {
            Operation::Unban { caller: clamp(caller), app, target }
        },
        Operation::Get { caller, app, key } => Operation::Get { caller: clamp(caller), app, key },
        Operation::GetIfChanged { caller, app, key, known } => {
            Operation::GetIfChanged { caller: clamp(caller), app, key, known }
        },
        Operation::Set { caller, app, key, value } => {
            Operation::Set { caller: clamp(caller), app, key, value }
        },
        Operation::Delete { caller, app, key } => Operation::Delete { caller: clamp(caller), app, key },
        Operation::Update { caller, app, key, expected, value } => {
            Operation::Update { caller: clamp(caller), app, key, expected, value }
        },
    }
}

#[cfg(test)]
mod smoke_tests {
    use super::*;

    #[test]
    fn real_world_basic_operations() {
        let mut model = ModelWorld::new(2);
        let mut real = RealWorld::new(2, 7);

        let ops = [
            Operation::Register { caller: 0, app: 1, read_mode: ModelMode(2), write_mode: ModelMode(1) },
            Operation::Set { caller: 1, app: 1, key: 0, value: SmallValue(1) },
            Operation::Set { caller: 0, app: 1, key: 0, value: SmallValue(1) },
            Operation::Get { caller: 1, app: 1, key: 0 },
            Operation::Authorize { caller: 0, app: 1, target: 1 },
            Operation::Authorize { caller: 0, app: 1, target: 1 },
            Operation::Get { caller: 1, app: 1, key: 0 },
            Operation::GetIfChanged { caller: 1, app: 1, key: 0, known: SmallValue(1) },
            Operation::Update { caller: 0, app: 1, key: 0, expected: SmallValue(2), value: SmallValue(3) },
            Operation::DeleteApp { caller: 0, app: 1 },
            Operation::Get { caller: 0, app: 1, key: 0 },
        ];
        let expected = [
            OperationResult::Ok,
            OperationResult::Error(OperationError::PermissionDenied),
            OperationResult::Ok,
            OperationResult::Error(OperationError::PermissionDenied),
            OperationResult::Ok,
            OperationResult::Error(OperationError::DuplicateMembership),
            OperationResult::Value(vec![1]),
            OperationResult::Unchanged,
            OperationResult::Error(OperationError::VersionMismatch),
            OperationResult::Ok,
            OperationResult::Error(OperationError::UnknownApplication),
        ];

        for (op, expected) in ops.iter().zip(expected) {
            assert_eq!(model.apply(op), expected, "model: {op:?}");
            assert_eq!(real.apply(op), expected, "real: {op:?}");
        }
    }
}
