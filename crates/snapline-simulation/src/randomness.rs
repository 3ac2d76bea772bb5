//! Deterministic Randomness
//!
//! Provides deterministic random number generation for simulations,
//! ensuring reproducible delivery orders and workloads with the same seed.

use rand::prelude::{RngCore, SeedableRng, StdRng};
use rand::Rng;

/// A wrapper around a seeded Pseudo-Random Number Generator (PRNG)
/// to ensure deterministic randomness in simulations.
#[derive(Debug, Clone)]
pub struct SeededRng {
    rng: StdRng,
    seed: u64,
}

impl SeededRng {
    /// Creates a new RNG instance seeded with the given 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates a new RNG instance from entropy.
    /// The generated seed is kept so the run can be replayed.
    pub fn from_entropy() -> Self {
        let seed = StdRng::from_entropy().next_u64();
        Self::new(seed)
    }

    /// Returns the seed used to initialize this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate a random value in the given range
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    /// Sample a random element from a slice
    pub fn sample<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let index = self.gen_range(0..slice.len());
            slice.get(index)
        }
    }
}

impl Default for SeededRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
