//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples bridge logic from system resources
//! (time, randomness, scheduling). Protocol state machines stay purely
//! synchronous; only driver code touches the async `sleep`, so the whole
//! coordinator can be exercised under a virtual clock with a seeded RNG.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses OS entropy in production
/// 3. Minimal panics: Methods are infallible except in exceptional
///    circumstances (e.g., OS entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be
    /// used by driver code (not bridge logic). Timer delays requested by the
    /// bridge are executed here.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Simulation implementations use a seeded RNG and MUST log the seed for
    /// reproducibility. Production implementations use the OS entropy pool.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Used for the per-instance client identifier.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
