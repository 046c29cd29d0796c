//! Speculative completion model
//!
//! Once an attempt has run for τ without finishing, a duplicate attempt is
//! forked with a fresh service time. The job finishes with whichever attempt
//! completes first:
//!
//! ```text
//! s <= τ   →  s
//! s >  τ   →  τ + min(s - τ, s2)
//! ```

use serde::{Deserialize, Serialize};

/// Effective completion of one job after the duplicate-on-timeout rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Effective (post-speculation) completion time
    pub time: f64,
    /// Whether a duplicate attempt was launched
    pub speculated: bool,
}

/// Map a raw service sample to its effective completion time.
///
/// `draw_duplicate` is only called when speculation triggers, so the
/// untriggered branch consumes no randomness.
pub fn effective_completion<F>(raw: f64, tau: f64, draw_duplicate: F) -> Completion
where
    F: FnOnce() -> f64,
{
    if raw <= tau {
        return Completion {
            time: raw,
            speculated: false,
        };
    }

    let duplicate = draw_duplicate();
    let residual = raw - tau;
    Completion {
        time: tau + residual.min(duplicate),
        speculated: true,
    }
}
