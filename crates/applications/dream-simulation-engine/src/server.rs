//! Fluid single-server queue with speculative retries
//!
//! Time advances in fixed increments. Each `step(dt)`:
//!
//! 1. Draws Poisson(λ·dt) arrivals, maps each service time through the
//!    speculative completion model and appends it to the queue tail
//! 2. Drains the queue against a processing budget of `dt`; a partially
//!    served head job keeps its progress for the next tick
//! 3. Treats the unconsumed budget as idle time
//! 4. Spends `min(idle, idle_budget · dt)` on background work
//! 5. Advances the clock by `dt`

use std::collections::VecDeque;

use rand_distr::Exp;
use tracing::debug;

use crate::budget::idle_budget;
use crate::dream::DreamLedger;
use crate::error::{Result, SimError};
use crate::metrics::percentile_sorted;
use crate::sampler::{exponential_distribution, Sampler};
use crate::speculation::{effective_completion, Completion};
use crate::types::{Job, MetricsSnapshot, ServerConfig, TickReport};
use crate::utilization::estimate_rho_tau;

/// Leftover processing time below this is float residue, not idle time
const RESIDUE_EPSILON: f64 = 1e-12;

/// Single-server queue state, owned by one simulation
pub struct SpeculativeServer {
    config: ServerConfig,
    sampler: Sampler,
    service: Exp<f64>,

    time: f64,
    queue: VecDeque<Job>,
    latencies: Vec<f64>,

    // Counters
    arrivals: u64,
    completions: u64,
    speculations: u64,
    idle_secs: f64,
    dreams: DreamLedger,
}

impl SpeculativeServer {
    /// Create a server with an empty queue, seeded from `config.seed`
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let service = exponential_distribution(config.mu)?;

        Ok(SpeculativeServer {
            sampler: Sampler::seeded(config.seed),
            service,
            config,
            time: 0.0,
            queue: VecDeque::new(),
            latencies: Vec::new(),
            arrivals: 0,
            completions: 0,
            speculations: 0,
            idle_secs: 0.0,
            dreams: DreamLedger::default(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Raw service time ~ Exp(μ)
    pub fn draw_service(&mut self) -> f64 {
        self.sampler.draw(&self.service)
    }

    /// Run a raw service sample through the duplicate-on-timeout rule
    pub fn speculate(&mut self, raw: f64) -> Completion {
        let tau = self.config.tau;
        let service = &self.service;
        let sampler = &mut self.sampler;
        effective_completion(raw, tau, || sampler.draw(service))
    }

    /// Fresh Monte Carlo estimate of ρ_τ using `samples` draws
    pub fn estimate_rho_tau(&mut self, samples: usize) -> Result<f64> {
        estimate_rho_tau(
            self.config.lam,
            self.config.tau,
            &self.service,
            samples,
            &mut self.sampler,
        )
    }

    /// Idle budget rate from a fresh ρ_τ estimate
    pub fn idle_budget(&mut self) -> Result<f64> {
        let rho = self.fresh_rho_tau()?;
        Ok(idle_budget(self.config.beta, rho))
    }

    /// Empty the queue and zero the clock, latency log and counters. The
    /// random stream carries on, so a cleared server does not replay its
    /// previous run.
    pub fn clear(&mut self) {
        self.time = 0.0;
        self.queue.clear();
        self.latencies.clear();
        self.arrivals = 0;
        self.completions = 0;
        self.speculations = 0;
        self.idle_secs = 0.0;
        self.dreams = DreamLedger::default();
    }

    /// Advance the simulation by `dt`
    pub fn step(&mut self, dt: f64) -> Result<TickReport> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::config(format!("time step dt must be > 0, got {}", dt)));
        }

        // Estimated once per tick, before any state changes
        let rho_tau = self.fresh_rho_tau()?;

        // Arrivals
        let arrivals = self.sampler.poisson(self.config.lam * dt)?;
        let mut speculations = 0;
        for _ in 0..arrivals {
            let raw = self.draw_service();
            let completion = self.speculate(raw);
            if completion.speculated {
                speculations += 1;
            }
            self.queue.push_back(Job::new(completion.time));
        }

        // Drain against the processing budget
        let mut budget = dt;
        let mut completions = 0;
        while let Some(head) = self.queue.front_mut() {
            if head.remaining <= budget {
                budget -= head.remaining;
                self.latencies.push(head.effective);
                self.queue.pop_front();
                completions += 1;
            } else {
                head.remaining -= budget;
                budget = 0.0;
                break;
            }
        }

        let idle = if budget > RESIDUE_EPSILON { budget } else { 0.0 };

        // Background work bounded by this tick's budget
        let budget_rate = idle_budget(self.config.beta, rho_tau);
        let budget_secs = budget_rate * dt;
        let dream_secs = idle.min(budget_secs).max(0.0);
        self.dreams.record(dream_secs);

        self.arrivals += arrivals;
        self.completions += completions;
        self.speculations += speculations;
        self.idle_secs += idle;
        self.time += dt;

        debug!(
            time = self.time,
            arrivals,
            completions,
            q_len = self.queue.len(),
            idle,
            rho_tau,
            dream_secs,
            "server tick"
        );

        Ok(TickReport {
            dt,
            arrivals,
            completions,
            speculations,
            idle_secs: idle,
            rho_tau,
            budget_rate,
            budget_secs,
            dream_secs,
        })
    }

    /// Current metrics. ρ_τ is re-estimated on every call (one batch per
    /// snapshot) and the idle budget is derived from that same estimate.
    pub fn snapshot(&mut self) -> Result<MetricsSnapshot> {
        let rho_tau_est = self.fresh_rho_tau()?;

        let mut sorted = self.latencies.clone();
        sorted.sort_by(f64::total_cmp);

        Ok(MetricsSnapshot {
            time: self.time,
            completions: self.completions,
            q_len: self.queue.len(),
            lat_p50: percentile_sorted(&sorted, 50.0),
            lat_p95: percentile_sorted(&sorted, 95.0),
            lat_p99: percentile_sorted(&sorted, 99.0),
            rho_tau_est,
            idle_budget: idle_budget(self.config.beta, rho_tau_est),
            dream_cpu_secs: self.dreams.cpu_secs(),
            dream_events: self.dreams.events(),
        })
    }

    fn fresh_rho_tau(&mut self) -> Result<f64> {
        self.estimate_rho_tau(self.config.samples)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn queue(&self) -> &VecDeque<Job> {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }

    pub fn speculations(&self) -> u64 {
        self.speculations
    }

    /// Cumulative idle time observed across ticks
    pub fn idle_secs(&self) -> f64 {
        self.idle_secs
    }

    pub fn dreams(&self) -> &DreamLedger {
        &self.dreams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(mu: f64, lam: f64, tau: f64, beta: f64, seed: u64) -> SpeculativeServer {
        let config = ServerConfig::new(mu, lam, tau, beta, seed)
            .unwrap()
            .with_samples(500)
            .unwrap();
        SpeculativeServer::new(config).unwrap()
    }

    #[test]
    fn test_server_creation() {
        let server = server(1.0, 0.5, 0.5, 0.3, 0);

        assert_eq!(server.time(), 0.0);
        assert_eq!(server.queue_len(), 0);
        assert_eq!(server.completions(), 0);
        assert_eq!(server.dreams().cpu_secs(), 0.0);
        assert_eq!(server.dreams().events(), 0);
    }

    #[test]
    fn test_idle_budget_increases_when_load_decreases() {
        let config = |lam| ServerConfig::new(1.0, lam, 0.5, 0.3, 1).unwrap();
        let b_high = SpeculativeServer::new(config(0.8)).unwrap().idle_budget().unwrap();
        let b_low = SpeculativeServer::new(config(0.4)).unwrap().idle_budget().unwrap();

        assert!(b_low >= b_high, "budget(λ=0.4)={} < budget(λ=0.8)={}", b_low, b_high);
    }

    #[test]
    fn test_invalid_dt_rejected() {
        let mut server = server(1.0, 0.5, 0.5, 0.3, 0);

        assert!(matches!(server.step(0.0), Err(SimError::Config(_))));
        assert!(matches!(server.step(-1.0), Err(SimError::Config(_))));
        assert!(matches!(server.step(f64::NAN), Err(SimError::Config(_))));
        assert_eq!(server.time(), 0.0);
    }

    #[test]
    fn test_empty_tick_is_all_idle() {
        let mut server = server(1.0, 0.0, 0.5, 0.3, 0);
        let report = server.step(2.0).unwrap();

        assert_eq!(report.arrivals, 0);
        assert_eq!(report.completions, 0);
        assert_eq!(report.idle_secs, 2.0);
        assert!((report.budget_secs - 0.6).abs() < 1e-12);
        assert!((report.dream_secs - 0.6).abs() < 1e-12);
        assert_eq!(server.time(), 2.0);
    }

    #[test]
    fn test_no_arrivals_end_to_end() {
        let mut server = server(1.0, 0.0, 0.5, 0.3, 0);

        for _ in 0..10 {
            let report = server.step(1.0).unwrap();
            assert!((report.budget_secs - 0.3 * 1.0).abs() < 1e-9);
            assert!((report.dream_secs - 0.3).abs() < 1e-9);
        }

        assert_eq!(server.completions(), 0);
        assert_eq!(server.arrivals(), 0);
        assert!((server.time() - 10.0).abs() < 1e-12);
        assert!((server.dreams().cpu_secs() - 3.0).abs() < 1e-9);
        assert_eq!(server.dreams().events(), 10);

        let snapshot = server.snapshot().unwrap();
        assert!(snapshot.lat_p50.is_nan());
        assert!((snapshot.idle_budget - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_drain_partial_service_carries_over() {
        let mut server = server(1.0, 0.0, 0.5, 0.0, 0);
        server.queue.push_back(Job::new(1.5));
        server.queue.push_back(Job::new(0.5));

        let report = server.step(1.0).unwrap();
        assert_eq!(report.completions, 0);
        assert_eq!(report.idle_secs, 0.0);
        assert!((server.queue()[0].remaining - 0.5).abs() < 1e-12);

        let report = server.step(1.0).unwrap();
        assert_eq!(report.completions, 2);
        assert_eq!(server.queue_len(), 0);
        // Latency is the job's effective completion time, not its residue
        assert_eq!(server.latencies(), &[1.5, 0.5]);
    }

    #[test]
    fn test_drain_tie_completes() {
        let mut server = server(1.0, 0.0, 0.5, 0.0, 0);
        server.queue.push_back(Job::new(0.25));
        server.queue.push_back(Job::new(0.75));

        let report = server.step(1.0).unwrap();
        assert_eq!(report.completions, 2);
        assert_eq!(server.queue_len(), 0);
        assert_eq!(report.idle_secs, 0.0);
    }

    #[test]
    fn test_drain_preserves_admission_order() {
        let mut server = server(1.0, 0.0, 0.5, 0.0, 0);
        for t in [0.1, 0.2, 0.3, 5.0, 0.1] {
            server.queue.push_back(Job::new(t));
        }

        server.step(1.0).unwrap();
        assert_eq!(server.latencies(), &[0.1, 0.2, 0.3]);
        assert_eq!(server.queue_len(), 2);
        assert!((server.queue()[0].remaining - 4.6).abs() < 1e-9);
        assert_eq!(server.queue()[1].remaining, 0.1);
    }

    #[test]
    fn test_dream_bounded_by_idle() {
        let mut server = server(1.0, 0.0, 0.5, 1.0, 0);
        server.queue.push_back(Job::new(0.9));

        let report = server.step(1.0).unwrap();
        // Budget is 1.0·dt but only 0.1 s was idle
        assert!((report.idle_secs - 0.1).abs() < 1e-9);
        assert!((report.dream_secs - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_run_invariants() {
        let mut server = server(1.0, 0.8, 0.5, 0.3, 42);
        let mut idle_total = 0.0;

        for _ in 0..200 {
            let report = server.step(0.5).unwrap();
            assert!(report.dream_secs <= report.idle_secs + 1e-12);
            idle_total += report.idle_secs;

            assert!(server.completions() <= server.arrivals());
            assert!(server.queue().iter().all(|job| job.remaining > 0.0));
        }

        assert!(server.dreams().cpu_secs() <= idle_total + 1e-9);
        assert!((server.idle_secs() - idle_total).abs() < 1e-9);
        assert_eq!(server.completions() + server.queue_len() as u64, server.arrivals());
        assert_eq!(server.latencies().len() as u64, server.completions());
    }

    #[test]
    fn test_speculation_shortens_mean_latency() {
        let mean_latency = |tau: f64| {
            let mut server = server(1.0, 0.5, tau, 0.3, 3);
            for _ in 0..2000 {
                server.step(1.0).unwrap();
            }
            assert_eq!(server.latencies().len() as u64, server.completions());
            assert!(server.latencies().iter().all(|l| l.is_finite() && *l > 0.0));
            let mean = server.latencies().iter().sum::<f64>() / server.latencies().len() as f64;
            (mean, server.speculations(), server.arrivals())
        };

        // E[S] = 1.0 without speculation; with τ = 0.1 it is
        // (1 - e^-0.1) + e^-0.1 · 0.5 ≈ 0.547
        let (plain, plain_specs, _) = mean_latency(f64::INFINITY);
        let (spec, specs, arrivals) = mean_latency(0.1);

        assert_eq!(plain_specs, 0);
        assert!(specs > 0);
        assert!(specs <= arrivals);
        assert!((plain - 1.0).abs() < 0.15, "plain mean latency {}", plain);
        assert!((spec - 0.547).abs() < 0.08, "speculative mean latency {}", spec);
        assert!(spec < plain);
    }

    #[test]
    fn test_arrival_rate_matches_lambda() {
        let config = ServerConfig::new(1.0, 0.8, 0.5, 0.3, 11)
            .unwrap()
            .with_samples(10)
            .unwrap();
        let mut server = SpeculativeServer::new(config).unwrap();
        let ticks = 4000;
        for _ in 0..ticks {
            server.step(0.5).unwrap();
        }

        // λ·dt = 0.4 arrivals per tick
        let rate = server.arrivals() as f64 / ticks as f64;
        assert!((rate - 0.4).abs() < 0.05, "arrivals per tick {}", rate);
    }

    #[test]
    fn test_failed_estimate_propagates() {
        let mut server = server(1.0, 0.5, 0.5, 0.3, 0);
        server.config.samples = 0;

        assert!(matches!(server.snapshot(), Err(SimError::Config(_))));
        assert!(matches!(server.idle_budget(), Err(SimError::Config(_))));
        assert!(matches!(server.step(1.0), Err(SimError::Config(_))));
        // Nothing moved
        assert_eq!(server.time(), 0.0);
        assert_eq!(server.arrivals(), 0);
        assert_eq!(server.dreams().events(), 0);
    }

    #[test]
    fn test_clear_restarts_run() {
        let mut server = server(1.0, 0.9, 0.5, 0.3, 5);
        for _ in 0..30 {
            server.step(1.0).unwrap();
        }
        assert!(server.arrivals() > 0);

        server.clear();
        assert_eq!(server.time(), 0.0);
        assert_eq!(server.queue_len(), 0);
        assert!(server.latencies().is_empty());
        assert_eq!(server.arrivals(), 0);
        assert_eq!(server.completions(), 0);
        assert_eq!(server.speculations(), 0);
        assert_eq!(server.idle_secs(), 0.0);
        assert_eq!(server.dreams().cpu_secs(), 0.0);
        assert_eq!(server.dreams().events(), 0);

        let report = server.step(1.0).unwrap();
        assert_eq!(server.time(), 1.0);
        assert_eq!(server.arrivals(), report.arrivals);
    }

    #[test]
    fn test_snapshot_idempotent_without_step() {
        let mut server = server(1.0, 0.7, 0.5, 0.3, 8);
        for _ in 0..20 {
            server.step(1.0).unwrap();
        }

        let a = server.snapshot().unwrap();
        let b = server.snapshot().unwrap();
        assert_eq!(a.completions, b.completions);
        assert_eq!(a.q_len, b.q_len);
        assert_eq!(a.dream_cpu_secs, b.dream_cpu_secs);
        assert_eq!(a.dream_events, b.dream_events);
        assert_eq!(a.time, b.time);
        // Percentiles come from the same latency log
        assert_eq!(a.lat_p50.to_bits(), b.lat_p50.to_bits());
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = server(1.0, 0.9, 0.4, 0.3, 17);
        let mut b = server(1.0, 0.9, 0.4, 0.3, 17);

        for _ in 0..30 {
            assert_eq!(a.step(1.0).unwrap(), b.step(1.0).unwrap());
        }
        assert_eq!(a.latencies(), b.latencies());
    }
}
