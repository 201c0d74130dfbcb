//! Deterministic environment.
//!
//! Seeded ChaCha RNG and a virtual clock. `sleep` advances the virtual clock
//! and completes immediately, so retry backoff costs no wall-clock time and
//! is observable through `now()`.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use appstate_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug)]
struct SimState {
    rng: ChaCha8Rng,
    elapsed: Duration,
}

/// Simulated environment. Clones share the same RNG stream and clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    origin: Instant,
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Create an environment whose random stream is fixed by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(SimState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).elapsed
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.elapsed += duration;
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).rng.fill_bytes(buffer);
    }
}
