//! Production Environment implementation using system time and RNG.

use std::time::{Duration, Instant};

use crate::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// - Uses `std::time::Instant::now()` for time
/// - Uses `tokio::time::sleep()` for async sleeping
/// - Uses `getrandom` for randomness
///
/// # Security
///
/// Application handles are drawn from OS entropy, so a handle cannot be
/// guessed from another application's handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Unreachable on supported platforms. Zero fill keeps the server
            // up; the registry rejects a handle that is already taken.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
