//! Core types for the simulation engine

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SimError};
use crate::utilization::DEFAULT_SAMPLES;

/// Immutable parameters of the speculative server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Service rate μ (jobs per unit time)
    pub mu: f64,
    /// Arrival rate λ
    pub lam: f64,
    /// Speculation timeout τ (`inf` disables speculation)
    pub tau: f64,
    /// Idle-budget scale β
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default)]
    pub seed: u64,
    /// Monte Carlo batch size for the ρ_τ estimate
    #[serde(default = "default_samples")]
    pub samples: usize,
}

fn default_beta() -> f64 {
    0.2
}

fn default_samples() -> usize {
    DEFAULT_SAMPLES
}

impl ServerConfig {
    /// Create a validated configuration with the default sample count
    pub fn new(mu: f64, lam: f64, tau: f64, beta: f64, seed: u64) -> Result<Self> {
        let config = ServerConfig {
            mu,
            lam,
            tau,
            beta,
            seed,
            samples: DEFAULT_SAMPLES,
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the Monte Carlo batch size
    pub fn with_samples(mut self, samples: usize) -> Result<Self> {
        self.samples = samples;
        self.validate()?;
        Ok(self)
    }

    /// Check μ > 0, λ ≥ 0, τ ≥ 0, β not NaN and a non-empty sample batch
    pub fn validate(&self) -> Result<()> {
        if !self.mu.is_finite() || self.mu <= 0.0 {
            return Err(SimError::config(format!("service rate mu must be > 0, got {}", self.mu)));
        }
        if !self.lam.is_finite() || self.lam < 0.0 {
            return Err(SimError::config(format!("arrival rate lam must be >= 0, got {}", self.lam)));
        }
        // τ = +inf is allowed and means "never speculate"
        if self.tau.is_nan() || self.tau < 0.0 {
            return Err(SimError::config(format!("timeout tau must be >= 0, got {}", self.tau)));
        }
        if self.beta.is_nan() {
            return Err(SimError::config("idle-budget scale beta must be a number"));
        }
        if self.samples == 0 {
            return Err(SimError::config("utilization sample count must be > 0"));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            mu: 1.0,
            lam: 0.6,
            tau: 0.5,
            beta: default_beta(),
            seed: 0,
            samples: DEFAULT_SAMPLES,
        }
    }
}

/// A queued job, known only by its service times
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Effective (post-speculation) completion time, logged as latency on completion
    pub effective: f64,
    /// Service still owed
    pub remaining: f64,
}

impl Job {
    pub fn new(effective: f64) -> Self {
        Job {
            effective,
            remaining: effective,
        }
    }
}

/// Point-in-time view of a server, recomputed on every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub time: f64,
    pub completions: u64,
    pub q_len: usize,
    /// NaN until the first completion, written as JSON `null`
    #[serde(deserialize_with = "nan_from_null")]
    pub lat_p50: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub lat_p95: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub lat_p99: f64,
    pub rho_tau_est: f64,
    pub idle_budget: f64,
    pub dream_cpu_secs: f64,
    pub dream_events: u64,
}

// serde_json writes NaN as null; read it back the same way
fn nan_from_null<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// What happened during one `step`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub dt: f64,
    pub arrivals: u64,
    pub completions: u64,
    /// Arrivals whose service exceeded τ and forked a duplicate
    pub speculations: u64,
    /// Processing time left over after the queue drained
    pub idle_secs: f64,
    /// ρ_τ estimated once for this tick
    pub rho_tau: f64,
    /// Budget rate derived from `rho_tau`
    pub budget_rate: f64,
    /// `budget_rate · dt`
    pub budget_secs: f64,
    /// Background work actually performed, `min(idle_secs, budget_secs)`
    pub dream_secs: f64,
}

/// One entry of the scheduling loop's history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord<M> {
    #[serde(flatten)]
    pub metrics: M,
    pub action: usize,
    pub reward: f64,
}

/// Background rehearsal the idle budget can be spent on
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DreamScenario {
    pub name: &'static str,
    /// Scenario length in seconds
    pub duration: f64,
    /// 0..1, how hard the scenario stresses the server
    pub severity: f64,
}

/// Built-in catalog of dream scenarios
pub const DREAM_SCENARIOS: [DreamScenario; 4] = [
    DreamScenario { name: "node_crash_short", duration: 1.0, severity: 0.7 },
    DreamScenario { name: "bandwidth_drop", duration: 2.0, severity: 0.4 },
    DreamScenario { name: "gc_pause", duration: 0.5, severity: 0.5 },
    DreamScenario { name: "load_spike", duration: 1.5, severity: 0.9 },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(ServerConfig::new(1.0, 0.5, 0.5, 0.3, 0).is_ok());
        assert!(ServerConfig::new(1.0, 0.0, 0.0, 0.3, 0).is_ok());
        assert!(ServerConfig::new(1.0, 0.5, f64::INFINITY, 0.3, 0).is_ok());

        assert!(ServerConfig::new(0.0, 0.5, 0.5, 0.3, 0).is_err());
        assert!(ServerConfig::new(-1.0, 0.5, 0.5, 0.3, 0).is_err());
        assert!(ServerConfig::new(1.0, -0.1, 0.5, 0.3, 0).is_err());
        assert!(ServerConfig::new(1.0, 0.5, -0.5, 0.3, 0).is_err());
        assert!(ServerConfig::new(1.0, 0.5, f64::NAN, 0.3, 0).is_err());
        assert!(ServerConfig::new(1.0, 0.5, 0.5, f64::NAN, 0).is_err());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let config = ServerConfig::new(1.0, 0.5, 0.5, 0.3, 0).unwrap();
        assert!(matches!(config.with_samples(0), Err(SimError::Config(_))));
    }

    #[test]
    fn test_config_json_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"mu": 2.0, "lam": 1.0, "tau": 0.25}"#).unwrap();
        assert_eq!(config.beta, 0.2);
        assert_eq!(config.seed, 0);
        assert_eq!(config.samples, DEFAULT_SAMPLES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tick_record_flattens_metrics() {
        let record = TickRecord {
            metrics: MetricsSnapshot {
                time: 1.0,
                completions: 2,
                q_len: 0,
                lat_p50: 0.5,
                lat_p95: 0.9,
                lat_p99: 0.99,
                rho_tau_est: 0.4,
                idle_budget: 0.18,
                dream_cpu_secs: 0.1,
                dream_events: 1,
            },
            action: 3,
            reward: 2.0,
        };

        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for key in [
            "time", "completions", "q_len", "lat_p50", "lat_p95", "lat_p99",
            "rho_tau_est", "idle_budget", "dream_cpu_secs", "dream_events", "action", "reward",
        ] {
            assert!(keys.contains(&key), "missing key {}", key);
        }
    }

    #[test]
    fn test_empty_snapshot_reads_back() {
        let snapshot = MetricsSnapshot {
            time: 2.0,
            completions: 0,
            q_len: 0,
            lat_p50: f64::NAN,
            lat_p95: f64::NAN,
            lat_p99: f64::NAN,
            rho_tau_est: 0.0,
            idle_budget: 0.2,
            dream_cpu_secs: 0.4,
            dream_events: 2,
        };
        let record = TickRecord { metrics: snapshot, action: 0, reward: 0.0 };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""lat_p50":null"#));

        let back: TickRecord<MetricsSnapshot> = serde_json::from_str(&json).unwrap();
        assert!(back.metrics.lat_p50.is_nan());
        assert!(back.metrics.lat_p95.is_nan());
        assert!(back.metrics.lat_p99.is_nan());
        assert_eq!(back.metrics.dream_events, 2);
        assert_eq!(back.action, 0);
    }
}
