use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded source of uniform(0,1) draws.
///
/// The same seed always yields the same sequence, so photon trajectories and
/// accumulator contents are reproducible bit for bit.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform draw from [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform draw from (0, 1). Zero is re-drawn so callers may take a
    /// logarithm of the result.
    pub fn uniform_open(&mut self) -> f64 {
        loop {
            let u = self.rng.gen::<f64>();
            if u > 0.0 {
                return u;
            }
        }
    }

    /// Next raw 64-bit value, used to derive per-worker seeds.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen::<u64>()
    }
}
