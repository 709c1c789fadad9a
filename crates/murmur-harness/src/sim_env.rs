//! Seeded environment for deterministic simulation.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use murmur_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Default seed for [`SimEnv::new`].
const DEFAULT_SEED: u64 = 0x6d75_726d_7572;

/// Simulation environment: tokio's clock and a seeded ChaCha RNG.
///
/// Time comes from `tokio::time`, so tests running with a paused clock
/// (`#[tokio::test(start_paused = true)]`) advance through sleeps and
/// timeouts instantly. Clones share one RNG stream, so the sequence of
/// random values depends only on the seed and the order of calls.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment with the default seed.
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Environment with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("SimEnv RNG mutex poisoned").fill_bytes(buffer);
    }
}
