//! Reference model for model-based testing.
//!
//! The model is a plain, single-threaded restatement of the protocol rules:
//! registry, membership lists, the four access modes, and compare-and-swap
//! over byte values. It serves as the oracle against which the dispatcher is
//! verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Rules, not mechanism: no caching, sharding, or hashing
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod world;

pub use operation::{
    APP_SLOTS, AppSlot, Caller, KEY_SLOTS, KeySlot, ModelMode, Operation, OperationError,
    OperationResult, SmallValue, app_name, key_name,
};
pub use world::{MODEL_MAX_VALUE_SIZE, ModelApp, ModelWorld, ObservableState};
