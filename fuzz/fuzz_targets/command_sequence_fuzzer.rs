//! Fuzz target for command sequences against a single dispatcher
//!
//! # Strategy
//!
//! - Small identifier spaces: three apps, three keys, three users plus
//!   anonymous, so duplicates and stale handles are common
//! - Values and hashes drawn from a tiny pool so compare-and-swap both
//!   wins and loses
//!
//! # Invariants
//!
//! - NEVER panic, NEVER report `Internal`
//! - A successful `Get` returns the last value written under that key
//! - `GetIfChanged` with the hash of the last written value is `Unchanged`
//! - A rejected write leaves the stored value untouched

#![no_main]

use std::{collections::HashMap, sync::Arc};

use appstate_core::{CoreConfig, Dispatcher, MemoryStore, StaticIdentityProvider, SystemEnv};
use appstate_proto::{
    AccessMode, AppKey, AuthToken, Command, ContentHash, ProtocolError, Reply, Request,
};
use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

const VALUES: [&[u8]; 4] = [b"", b"a", b"bb", b"ccc"];

#[derive(Debug, Arbitrary)]
enum FuzzCommand {
    Register { app: u8, read: u8, write: u8 },
    DeleteApp { app: u8 },
    Membership { app: u8, target: u8, op: u8 },
    Get { app: u8, key: u8 },
    GetIfChanged { app: u8, key: u8, known: u8 },
    Set { app: u8, key: u8, value: u8 },
    Delete { app: u8, key: u8 },
    Update { app: u8, key: u8, expected: u8, value: u8 },
}

#[derive(Debug, Arbitrary)]
struct Step {
    caller: u8,
    command: FuzzCommand,
}

fn value(n: u8) -> Bytes {
    Bytes::from_static(VALUES[usize::from(n) % VALUES.len()])
}

fn mode(n: u8) -> AccessMode {
    AccessMode::ALL[usize::from(n) % AccessMode::ALL.len()]
}

fuzz_target!(|steps: Vec<Step>| {
    let identity = StaticIdentityProvider::new()
        .with_user("t0", "U0")
        .with_user("t1", "U1")
        .with_user("t2", "U2");
    let dispatcher = Dispatcher::new(
        Arc::new(MemoryStore::new()),
        CoreConfig::default(),
        Arc::new(identity),
        SystemEnv::new(),
    );

    let mut handles: HashMap<u8, AppKey> = HashMap::new();
    // Last value successfully written per (app slot, key)
    let mut written: HashMap<(u8, u8), Bytes> = HashMap::new();

    for step in steps {
        let slot = |app: u8| app % 3;
        let handle = |app: u8| handles.get(&slot(app)).copied().unwrap_or(AppKey::new(0));
        let key = |k: u8| format!("key-{}", k % 3);

        let (command, target) = match step.command {
            FuzzCommand::Register { app, read, write } => (
                Command::RegisterApp { app_id: format!("app-{}", slot(app)), read_mode: mode(read), write_mode: mode(write) },
                None,
            ),
            FuzzCommand::DeleteApp { app } => (Command::DeleteApp { app: handle(app) }, None),
            FuzzCommand::Membership { app, target, op } => {
                let app = handle(app);
                let user = format!("U{}", target % 3);
                let command = match op % 4 {
                    0 => Command::Authorize { app, user },
                    1 => Command::Unauthorize { app, user },
                    2 => Command::Ban { app, user },
                    _ => Command::Unban { app, user },
                };
                (command, None)
            },
            FuzzCommand::Get { app, key: k } => {
                (Command::Get { app: handle(app), key: key(k) }, Some((slot(app), k % 3)))
            },
            FuzzCommand::GetIfChanged { app, key: k, known } => (
                Command::GetIfChanged { app: handle(app), key: key(k), known: ContentHash::of(&value(known)) },
                Some((slot(app), k % 3)),
            ),
            FuzzCommand::Set { app, key: k, value: v } => {
                (Command::Set { app: handle(app), key: key(k), value: value(v) }, Some((slot(app), k % 3)))
            },
            FuzzCommand::Delete { app, key: k } => {
                (Command::Delete { app: handle(app), key: key(k) }, Some((slot(app), k % 3)))
            },
            FuzzCommand::Update { app, key: k, expected, value: v } => (
                Command::Update {
                    app: handle(app),
                    key: key(k),
                    expected: ContentHash::of(&value(expected)),
                    value: value(v),
                },
                Some((slot(app), k % 3)),
            ),
        };

        let request = match step.caller % 4 {
            3 => Request::anonymous(command.clone()),
            n => Request::authenticated(AuthToken::new(format!("t{n}")), command.clone()),
        };
        let response = dispatcher.handle(request);
        assert!(!matches!(response, Err(ProtocolError::Internal { .. })), "{response:?}");

        match (&command, &response) {
            (Command::RegisterApp { app_id, .. }, Ok(Reply::AppKey(key))) => {
                let slot = app_id.trim_start_matches("app-").parse().expect("slot");
                handles.insert(slot, *key);
                written.retain(|(s, _), _| *s != slot);
            },
            (Command::DeleteApp { app }, Ok(Reply::Ok)) => {
                let slot = handles.iter().find(|(_, k)| *k == app).map(|(s, _)| *s).expect("known");
                handles.remove(&slot);
                written.retain(|(s, _), _| *s != slot);
            },
            (Command::Set { value, .. } | Command::Update { value, .. }, Ok(Reply::Ok)) => {
                written.insert(target.expect("data command"), value.clone());
            },
            (Command::Delete { .. }, Ok(Reply::Ok)) => {
                written.remove(&target.expect("data command"));
            },
            (Command::Get { .. }, Ok(Reply::Value(value))) => {
                assert_eq!(Some(value), written.get(&target.expect("data command")));
            },
            (Command::GetIfChanged { known, .. }, Ok(reply)) => {
                let last = written.get(&target.expect("data command")).expect("value exists");
                match reply {
                    Reply::Unchanged => assert_eq!(ContentHash::of(last), *known),
                    Reply::Value(value) => {
                        assert_eq!(value, last);
                        assert_ne!(ContentHash::of(last), *known);
                    },
                    other => panic!("unexpected reply {other:?}"),
                }
            },
            (Command::Get { .. }, Err(ProtocolError::KeyNotFound { .. })) => {
                assert!(!written.contains_key(&target.expect("data command")));
            },
            _ => {},
        }
    }
});
