//! Deterministic in-process harness for AppState protocol testing.
//!
//! Runs the real dispatcher and real clients in one process: a seeded
//! [`SimEnv`] replaces wall-clock time and OS randomness, and a
//! [`LocalChannel`] replaces the TCP transport. Tests built on it are
//! reproducible from their seed.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and the dispatcher, and
//! their results and observable state are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod local_channel;
pub mod model;
pub mod sim_env;
pub mod sim_world;

pub use local_channel::LocalChannel;
pub use model::{
    AppSlot, Caller, KeySlot, MODEL_MAX_VALUE_SIZE, ModelApp, ModelMode, ModelWorld,
    ObservableState, Operation, OperationError, OperationResult, SmallValue,
};
pub use sim_env::SimEnv;
pub use sim_world::{SimClient, SimWorld};
