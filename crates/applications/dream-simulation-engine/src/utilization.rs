//! Monte Carlo estimate of the speculation-adjusted utilization ρ_τ
//!
//! ρ_τ = λ · E[S_τ], where S_τ is the effective service time after the
//! duplicate-on-timeout rule. E[S_τ] is estimated from a fresh batch of
//! samples on every call, so consecutive calls fluctuate within Monte Carlo
//! noise. Callers that need one stable value per tick call this once and
//! reuse the result.

use rand_distr::Exp;
use tracing::warn;

use crate::budget::RHO_CAP;
use crate::error::{Result, SimError};
use crate::sampler::Sampler;
use crate::speculation::effective_completion;

/// Default Monte Carlo batch size
pub const DEFAULT_SAMPLES: usize = 2000;

/// Estimate ρ_τ = min(0.999, λ · mean effective service time).
///
/// All raw service times are drawn first, then each one is mapped through the
/// completion model (duplicates are drawn from the same stream as needed).
pub fn estimate_rho_tau(
    lam: f64,
    tau: f64,
    service: &Exp<f64>,
    samples: usize,
    sampler: &mut Sampler,
) -> Result<f64> {
    if samples == 0 {
        return Err(SimError::config("utilization sample count must be > 0"));
    }

    let raw: Vec<f64> = (0..samples).map(|_| sampler.draw(service)).collect();
    let total: f64 = raw
        .into_iter()
        .map(|s| effective_completion(s, tau, || sampler.draw(service)).time)
        .sum();
    let mean = total / samples as f64;

    let rho = lam * mean;
    if rho >= RHO_CAP {
        warn!(rho, cap = RHO_CAP, "speculation-adjusted utilization saturated");
    }
    Ok(rho.min(RHO_CAP))
}
