// RandomState — Per-instance generator state for stochastic functions
//
// A stochastic function owns one `RandomState` by composition. It holds:
//
//   seed               — explicit, or drawn from the process seed source
//   rng                — the live generator; forward draws from it
//   rng_for_recompute  — a snapshot of `rng` taken BEFORE forward's draws
//
// RECOMPUTE:
//
//   forward:   snapshot = rng.clone(); draw from rng      (rng advances)
//   recompute: tmp = snapshot.clone(); draw from tmp      (rng untouched)
//
// Recompute therefore reproduces the last forward bit for bit, any number of
// times, no matter how far the live generator has moved since.
//
// PROCESS SEED SOURCE:
//
//   Unseeded functions take their seed from a process-wide generator at
//   construction. It is entropy-seeded unless `set_seed` is called, so runs
//   are not reproducible by default, but each instance's seed is fixed for
//   its whole lifetime (and inherited by `copy()`).

use std::sync::{LazyLock, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

static SEED_SOURCE: LazyLock<Mutex<StdRng>> = LazyLock::new(|| Mutex::new(StdRng::from_entropy()));

/// Reseed the process seed source used by unseeded stochastic functions.
pub fn set_seed(seed: u64) {
    let mut source = SEED_SOURCE.lock().unwrap_or_else(PoisonError::into_inner);
    *source = StdRng::seed_from_u64(seed);
}

/// Draw the next seed from the process seed source.
pub fn next_seed() -> u64 {
    SEED_SOURCE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .gen()
}

/// Seed, live generator and recompute snapshot of one stochastic function.
#[derive(Debug, Clone)]
pub struct RandomState {
    seed: u64,
    rng: StdRng,
    rng_for_recompute: Option<StdRng>,
}

impl RandomState {
    /// State seeded with `seed`, or with a seed from the process source.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(next_seed);
        RandomState {
            seed,
            rng: StdRng::seed_from_u64(seed),
            rng_for_recompute: None,
        }
    }

    /// The resolved seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A new state restarted from the same seed, sharing nothing with `self`.
    pub fn restarted(&self) -> Self {
        RandomState::new(Some(self.seed))
    }

    /// The live generator for a forward pass. With `save`, the current state
    /// is snapshotted first so `rng_for_recompute` can replay the draws.
    pub fn rng_for_forward(&mut self, save: bool) -> &mut StdRng {
        if save {
            self.rng_for_recompute = Some(self.rng.clone());
        }
        &mut self.rng
    }

    /// A generator positioned where the last saved forward started.
    pub fn rng_for_recompute(&self) -> Option<StdRng> {
        self.rng_for_recompute.clone()
    }

    pub fn has_snapshot(&self) -> bool {
        self.rng_for_recompute.is_some()
    }
}
