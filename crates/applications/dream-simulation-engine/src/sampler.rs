//! Seeded random draws for a single simulation instance
//!
//! Every server, environment and policy owns its own [`Sampler`]. Nothing here
//! touches a process-wide generator, so two runs with the same seed and the
//! same call sequence produce identical trajectories.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Poisson};

use crate::error::{Result, SimError};

/// Seeded pseudo-random stream
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler from a 64-bit seed
    pub fn seeded(seed: u64) -> Self {
        Sampler {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Exponential draw with mean `1 / rate`
    pub fn exponential(&mut self, rate: f64) -> Result<f64> {
        let exp = exponential_distribution(rate)?;
        Ok(self.draw(&exp))
    }

    /// Poisson-distributed count with the given mean
    ///
    /// A zero mean returns 0 without advancing the generator.
    pub fn poisson(&mut self, mean: f64) -> Result<u64> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(SimError::config(format!(
                "poisson mean must be finite and >= 0, got {}",
                mean
            )));
        }
        if mean == 0.0 {
            return Ok(0);
        }

        let poisson = Poisson::new(mean)
            .map_err(|e| SimError::config(format!("poisson mean {}: {}", mean, e)))?;
        let count: f64 = poisson.sample(&mut self.rng);
        Ok(count as u64)
    }

    /// Draw from a prebuilt distribution
    pub fn draw<D: Distribution<f64>>(&mut self, dist: &D) -> f64 {
        dist.sample(&mut self.rng)
    }

    /// Uniform draw in `[0, 1)`
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    /// `true` with probability `p`. Callers validate `p` into `[0, 1]`.
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// Uniform index in `0..n` (`n` must be non-zero)
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}

/// Build an `Exp(rate)` distribution, rejecting non-positive or non-finite rates
pub fn exponential_distribution(rate: f64) -> Result<Exp<f64>> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(SimError::config(format!(
            "exponential rate must be finite and > 0, got {}",
            rate
        )));
    }
    Exp::new(rate).map_err(|e| SimError::config(format!("exponential rate {}: {}", rate, e)))
}
