//! Fuzz target for frame decoding and dispatch of untrusted input
//!
//! # Strategy
//!
//! - Raw bytes: Arbitrary length prefixes and CBOR payloads
//! - Decoded requests: Dispatched against a live dispatcher
//!
//! # Invariants
//!
//! - NEVER panic on malformed frames
//! - Declared length above the maximum MUST reject before decoding
//! - Any decoded request yields an encodable response
//! - Dispatch never reports `Internal`

#![no_main]

use std::sync::{Arc, LazyLock};

use appstate_core::{CoreConfig, Dispatcher, MemoryStore, StaticIdentityProvider, SystemEnv};
use appstate_proto::{FrameError, ProtocolError, Request, Response, frame};
use libfuzzer_sys::fuzz_target;

const MAX_FRAME: usize = 4096;

static DISPATCHER: LazyLock<Dispatcher<MemoryStore, SystemEnv>> = LazyLock::new(|| {
    let identity = StaticIdentityProvider::new().with_user("t1", "U1").with_user("t2", "U2");
    Dispatcher::new(
        Arc::new(MemoryStore::new()),
        CoreConfig { max_value_size: 256, ..CoreConfig::default() },
        Arc::new(identity),
        SystemEnv::new(),
    )
});

fuzz_target!(|data: &[u8]| {
    if let Ok(prefix) = <[u8; 4]>::try_from(data.get(..4).unwrap_or_default()) {
        let declared = u32::from_be_bytes(prefix) as usize;
        if declared > MAX_FRAME {
            assert!(matches!(
                frame::decode::<Request>(data, MAX_FRAME),
                Err(FrameError::TooLarge { .. })
            ));
            return;
        }
    }

    let _ = frame::decode::<Response>(data, MAX_FRAME);

    let Ok(request) = frame::decode::<Request>(data, MAX_FRAME) else {
        return;
    };

    let response = DISPATCHER.handle(request);
    assert!(!matches!(response, Err(ProtocolError::Internal { .. })), "{response:?}");

    let encoded = frame::encode(&response, usize::MAX).expect("response encodes");
    let decoded: Response = frame::decode(&encoded, usize::MAX).expect("response decodes");
    assert_eq!(decoded, response);
});
