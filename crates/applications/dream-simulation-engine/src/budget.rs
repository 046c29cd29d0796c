//! Idle budget: the share of capacity safe to spend on background work

/// Utilization cap. The server is never treated as fully saturated.
pub const RHO_CAP: f64 = 0.999;

/// Spare-capacity allowance for a given speculation-adjusted utilization.
///
/// `max(0, β · (1 − clamp(ρ_τ, 0, 0.999)))`. The clamp is applied here even
/// when the caller passes a raw, uncapped ρ_τ.
pub fn idle_budget(beta: f64, rho_tau: f64) -> f64 {
    let rho = rho_tau.clamp(0.0, RHO_CAP);
    (beta * (1.0 - rho)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_budget_basic() {
        assert!((idle_budget(0.3, 0.0) - 0.3).abs() < 1e-12);
        assert!((idle_budget(0.2, 0.5) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_non_increasing_in_rho() {
        for beta in [0.05, 0.2, 0.3, 1.0, 4.0] {
            let mut prev = f64::INFINITY;
            for i in 0..=100 {
                let rho = i as f64 / 100.0;
                let b = idle_budget(beta, rho);
                assert!(b >= 0.0);
                assert!(b <= prev, "beta={} rho={} budget rose", beta, rho);
                prev = b;
            }
        }
    }

    #[test]
    fn test_non_decreasing_in_beta() {
        let mut prev = 0.0;
        for i in 0..=20 {
            let b = idle_budget(i as f64 * 0.1, 0.6);
            assert!(b >= prev);
            prev = b;
        }
    }

    #[test]
    fn test_raw_rho_is_clamped() {
        // Saturated input still leaves the 0.1% floor
        assert!((idle_budget(1.0, 5.0) - (1.0 - RHO_CAP)).abs() < 1e-12);
        // Negative utilization cannot inflate the budget past β
        assert!((idle_budget(0.3, -2.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_negative_beta_floors_at_zero() {
        assert_eq!(idle_budget(-0.5, 0.2), 0.0);
    }
}
