//! Reproducible Gaussian sampling.
//!
//! Source nucleation noise draws from a seeded stream of N(μ, σ)
//! samples owned by the polycrystal, so a run is repeatable from its
//! seed alone.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// A seeded stream of independent normal samples.
#[derive(Debug, Clone)]
pub struct GaussianSampler {
    rng: ChaCha8Rng,
}

impl GaussianSampler {
    /// Create a sampler from a seed. Equal seeds produce equal streams.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw one sample from N(mean, stdev). A non-positive standard
    /// deviation degenerates to the mean without consuming randomness.
    pub fn sample(&mut self, mean: f64, stdev: f64) -> f64 {
        if stdev <= 0.0 {
            return mean;
        }
        match Normal::new(mean, stdev) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(_) => mean,
        }
    }

    /// Fill a vector with `n` samples from N(mean, stdev).
    pub fn sample_n(&mut self, n: usize, mean: f64, stdev: f64) -> Vec<f64> {
        (0..n).map(|_| self.sample(mean, stdev)).collect()
    }
}
