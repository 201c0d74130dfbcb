//! Client configuration.

use crate::retry::RetryPolicy;

/// Client behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientConfig {
    /// Behaviour of `apply_op` after a lost compare-and-swap.
    pub retry: RetryPolicy,
}
