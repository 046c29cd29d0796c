//! Environments driven by the scheduling loop
//!
//! - [`SpeculativeServer`]: the fluid queue. Actions pick which dream scenario
//!   the idle budget rehearses; they do not change queue dynamics.
//! - [`FailureRepairEnv`]: discrete per-tick queue whose server fails and
//!   recovers by independent Bernoulli trials. Actions decide admission.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SimError};
use crate::sampler::Sampler;
use crate::server::SpeculativeServer;
use crate::types::{MetricsSnapshot, DREAM_SCENARIOS};

/// Outcome of applying one action for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S, M> {
    pub state: S,
    pub reward: f64,
    pub done: bool,
    pub metrics: M,
}

/// Anything the scheduling loop can drive
pub trait Environment {
    /// What the policy observes
    type State;
    /// What the history log records each tick
    type Metrics: Serialize;

    /// Size of the action space; valid actions are `0..num_actions()`
    fn num_actions(&self) -> usize;

    /// Clear run state and return the initial observation
    fn reset(&mut self) -> Result<Self::State>;

    /// Apply `action` and advance by `dt`
    fn advance(&mut self, action: usize, dt: f64) -> Result<Transition<Self::State, Self::Metrics>>;
}

fn check_action(action: usize, num_actions: usize) -> Result<()> {
    if action >= num_actions {
        return Err(SimError::invalid_action(action, num_actions));
    }
    Ok(())
}

impl Environment for SpeculativeServer {
    type State = MetricsSnapshot;
    type Metrics = MetricsSnapshot;

    fn num_actions(&self) -> usize {
        DREAM_SCENARIOS.len()
    }

    fn reset(&mut self) -> Result<MetricsSnapshot> {
        self.clear();
        self.snapshot()
    }

    /// Reward is +1 per completion; the fluid server never drops jobs
    fn advance(&mut self, action: usize, dt: f64) -> Result<Transition<MetricsSnapshot, MetricsSnapshot>> {
        check_action(action, self.num_actions())?;

        let report = self.step(dt)?;
        let snapshot = self.snapshot()?;
        debug!(scenario = DREAM_SCENARIOS[action].name, dream_secs = report.dream_secs, "dream scenario");

        Ok(Transition {
            state: snapshot.clone(),
            reward: report.completions as f64,
            done: false,
            metrics: snapshot,
        })
    }
}

/// Action: leave the queue alone
pub const ACTION_NOOP: usize = 0;
/// Action: admit one job
pub const ACTION_ADMIT: usize = 1;
/// Size of the failure/repair action space
pub const NUM_ACTIONS: usize = 2;

/// Failure/repair environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub max_queue: usize,
    /// Per-tick probability an up server fails
    pub fail_prob: f64,
    /// Per-tick probability a down server recovers
    pub repair_prob: f64,
    /// Ticks per episode
    pub episode_len: u64,
    pub seed: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            max_queue: 10,
            fail_prob: 0.05,
            repair_prob: 0.2,
            episode_len: 50,
            seed: 0,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_queue == 0 {
            return Err(SimError::config("max_queue must be > 0"));
        }
        for (name, p) in [("fail_prob", self.fail_prob), ("repair_prob", self.repair_prob)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::config(format!("{} must be in [0, 1], got {}", name, p)));
            }
        }
        if self.episode_len == 0 {
            return Err(SimError::config("episode_len must be > 0"));
        }
        Ok(())
    }
}

/// Observation of the failure/repair environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub queue_len: usize,
    pub server_up: bool,
}

/// Per-tick record for the history log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub steps: u64,
    pub q_len: usize,
    pub server_up: bool,
    pub processed: u64,
    pub dropped: u64,
}

/// Discrete queue with a server that fails and recovers at random
pub struct FailureRepairEnv {
    config: EnvConfig,
    sampler: Sampler,

    queue_len: usize,
    server_up: bool,
    processed: u64,
    dropped: u64,
    steps: u64,

    /// Completed down-interval lengths in ticks
    downtime_log: Vec<u64>,
    downtime_start: Option<u64>,
}

impl FailureRepairEnv {
    pub fn new(config: EnvConfig) -> Result<Self> {
        config.validate()?;
        Ok(FailureRepairEnv {
            sampler: Sampler::seeded(config.seed),
            config,
            queue_len: 0,
            server_up: true,
            processed: 0,
            dropped: 0,
            steps: 0,
            downtime_log: Vec::new(),
            downtime_start: None,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn observation(&self) -> Observation {
        Observation {
            queue_len: self.queue_len,
            server_up: self.server_up,
        }
    }

    pub fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            steps: self.steps,
            q_len: self.queue_len,
            server_up: self.server_up,
            processed: self.processed,
            dropped: self.dropped,
        }
    }

    /// One discrete tick. Returns the reward: +1 per processed job, −1 per drop.
    pub fn tick(&mut self, action: usize) -> Result<f64> {
        check_action(action, NUM_ACTIONS)?;
        let mut reward = 0.0;

        if action == ACTION_ADMIT {
            if self.queue_len < self.config.max_queue {
                self.queue_len += 1;
            } else {
                self.dropped += 1;
                reward -= 1.0;
            }
        }

        let was_up = self.server_up;
        if self.server_up && self.sampler.bernoulli(self.config.fail_prob) {
            self.server_up = false;
        }
        // A server that just failed may recover within the same tick
        if !self.server_up && self.sampler.bernoulli(self.config.repair_prob) {
            self.server_up = true;
        }

        match (was_up, self.server_up) {
            (true, false) => self.downtime_start = Some(self.steps),
            (false, true) => {
                if let Some(start) = self.downtime_start.take() {
                    self.downtime_log.push(self.steps - start);
                }
            }
            _ => {}
        }

        if self.server_up && self.queue_len > 0 {
            self.queue_len -= 1;
            self.processed += 1;
            reward += 1.0;
        }

        self.steps += 1;
        debug!(
            step = self.steps,
            queue_len = self.queue_len,
            server_up = self.server_up,
            reward,
            "env tick"
        );
        Ok(reward)
    }

    pub fn is_done(&self) -> bool {
        self.steps >= self.config.episode_len
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len
    }

    pub fn server_up(&self) -> bool {
        self.server_up
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn downtime_log(&self) -> &[u64] {
        &self.downtime_log
    }
}

impl Environment for FailureRepairEnv {
    type State = Observation;
    type Metrics = EnvSnapshot;

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn reset(&mut self) -> Result<Observation> {
        self.queue_len = 0;
        self.server_up = true;
        self.processed = 0;
        self.dropped = 0;
        self.steps = 0;
        self.downtime_log.clear();
        self.downtime_start = None;
        Ok(self.observation())
    }

    /// `dt` is ignored: the environment always advances one discrete tick
    fn advance(&mut self, action: usize, _dt: f64) -> Result<Transition<Observation, EnvSnapshot>> {
        let reward = self.tick(action)?;
        Ok(Transition {
            state: self.observation(),
            reward,
            done: self.is_done(),
            metrics: self.snapshot(),
        })
    }
}
