//! Decision policies for the scheduling loop
//!
//! Implements multiple policies to compare:
//! - Epsilon-greedy bandit: state-free, learns per-action mean reward
//! - Q-learning: tabular, over the failure/repair environment's observation
//! - Reactive: admit whenever the server is up and the queue has room
//! - Fixed: always the same action
//!
//! Learning is an optional capability. A policy that can learn returns itself
//! from [`Policy::learner`]; the loop calls the hooks only through that.

use tracing::warn;

use crate::env::{Observation, ACTION_ADMIT, ACTION_NOOP};
use crate::error::{Result, SimError};
use crate::sampler::Sampler;

/// Base policy contract
pub trait Policy<S> {
    /// Choose an action index for the observed state
    fn select_action(&mut self, state: &S) -> usize;

    /// Get policy name
    fn name(&self) -> &str;

    /// Learning hooks, if this policy has any
    fn learner(&mut self) -> Option<&mut dyn Learner<S>> {
        None
    }
}

/// Optional learning capability. Every hook defaults to a no-op.
pub trait Learner<S> {
    /// Reward feedback for the last action (bandit-style)
    fn update(&mut self, _action: usize, _reward: f64) {}

    /// Full transition feedback (temporal-difference style)
    fn learn(&mut self, _state: &S, _action: usize, _reward: f64, _next_state: &S) {}

    /// End-of-episode exploration decay
    fn decay(&mut self) {}
}

fn check_probability(name: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SimError::config(format!("{} must be in [0, 1], got {}", name, p)));
    }
    Ok(())
}

/// Index of the largest value; ties go to the lowest index
fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (i, &v)| if v > values[best] { i } else { best })
}

/// Epsilon-greedy multi-armed bandit
pub struct EpsilonGreedyBandit {
    epsilon: f64,
    sampler: Sampler,
    counts: Vec<u64>,
    values: Vec<f64>,
}

impl EpsilonGreedyBandit {
    pub fn new(num_actions: usize, epsilon: f64, seed: u64) -> Result<Self> {
        if num_actions == 0 {
            return Err(SimError::config("bandit needs at least one action"));
        }
        check_probability("epsilon", epsilon)?;

        Ok(EpsilonGreedyBandit {
            epsilon,
            sampler: Sampler::seeded(seed),
            counts: vec![0; num_actions],
            values: vec![0.0; num_actions],
        })
    }

    /// Estimated mean reward per action
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }
}

impl<S> Policy<S> for EpsilonGreedyBandit {
    fn select_action(&mut self, _state: &S) -> usize {
        if self.sampler.uniform() < self.epsilon {
            self.sampler.index(self.values.len())
        } else {
            argmax(&self.values)
        }
    }

    fn name(&self) -> &str {
        "EpsilonGreedyBandit"
    }

    fn learner(&mut self) -> Option<&mut dyn Learner<S>> {
        Some(self)
    }
}

impl<S> Learner<S> for EpsilonGreedyBandit {
    fn update(&mut self, action: usize, reward: f64) {
        let Some(count) = self.counts.get_mut(action) else {
            warn!(action, num_actions = self.values.len(), reward, "bandit feedback for unknown action dropped");
            return;
        };
        *count += 1;
        let q = self.values[action];
        self.values[action] = q + (reward - q) / *count as f64;
    }
}

/// Q-learning hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct QLearningConfig {
    /// α
    pub learning_rate: f64,
    /// γ
    pub discount_factor: f64,
    /// Initial exploration rate
    pub epsilon: f64,
    pub epsilon_decay_rate: f64,
    pub min_epsilon: f64,
    pub seed: u64,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        QLearningConfig {
            learning_rate: 0.1,
            discount_factor: 0.95,
            epsilon: 1.0,
            epsilon_decay_rate: 0.995,
            min_epsilon: 0.01,
            seed: 0,
        }
    }
}

/// Tabular Q-learning over `(queue_len, server_up, action)`
pub struct QLearningAgent {
    config: QLearningConfig,
    epsilon: f64,
    sampler: Sampler,
    max_queue: usize,
    num_actions: usize,
    q_table: Vec<f64>,
}

impl QLearningAgent {
    pub fn new(max_queue: usize, num_actions: usize, config: QLearningConfig) -> Result<Self> {
        if num_actions == 0 {
            return Err(SimError::config("Q-learning needs at least one action"));
        }
        check_probability("learning_rate", config.learning_rate)?;
        check_probability("discount_factor", config.discount_factor)?;
        check_probability("epsilon", config.epsilon)?;
        check_probability("epsilon_decay_rate", config.epsilon_decay_rate)?;
        check_probability("min_epsilon", config.min_epsilon)?;

        Ok(QLearningAgent {
            epsilon: config.epsilon,
            sampler: Sampler::seeded(config.seed),
            max_queue,
            num_actions,
            q_table: vec![0.0; (max_queue + 1) * 2 * num_actions],
            config,
        })
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Q-values of every action for an observation
    pub fn q_values(&self, state: &Observation) -> &[f64] {
        let start = self.row(state);
        &self.q_table[start..start + self.num_actions]
    }

    // Queue lengths beyond max_queue share the last row
    fn row(&self, state: &Observation) -> usize {
        let q = state.queue_len.min(self.max_queue);
        (q * 2 + state.server_up as usize) * self.num_actions
    }
}

impl Policy<Observation> for QLearningAgent {
    fn select_action(&mut self, state: &Observation) -> usize {
        if self.sampler.uniform() < self.epsilon {
            self.sampler.index(self.num_actions)
        } else {
            argmax(self.q_values(state))
        }
    }

    fn name(&self) -> &str {
        "QLearning"
    }

    fn learner(&mut self) -> Option<&mut dyn Learner<Observation>> {
        Some(self)
    }
}

impl Learner<Observation> for QLearningAgent {
    fn learn(&mut self, state: &Observation, action: usize, reward: f64, next_state: &Observation) {
        if action >= self.num_actions {
            warn!(action, num_actions = self.num_actions, reward, "q-learning update for unknown action dropped");
            return;
        }
        let max_next = self
            .q_values(next_state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        let idx = self.row(state) + action;
        let current = self.q_table[idx];
        let target = reward + self.config.discount_factor * max_next;
        self.q_table[idx] = current + self.config.learning_rate * (target - current);
    }

    fn decay(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay_rate).max(self.config.min_epsilon);
    }
}

/// Admit a job whenever the server is up and the queue has room. No learning.
pub struct ReactiveAgent {
    queue_capacity: usize,
}

impl ReactiveAgent {
    pub fn new(queue_capacity: usize) -> Self {
        ReactiveAgent { queue_capacity }
    }
}

impl Policy<Observation> for ReactiveAgent {
    fn select_action(&mut self, state: &Observation) -> usize {
        if state.server_up && state.queue_len < self.queue_capacity {
            ACTION_ADMIT
        } else {
            ACTION_NOOP
        }
    }

    fn name(&self) -> &str {
        "Reactive"
    }
}

/// Always picks the same action
pub struct FixedPolicy {
    action: usize,
}

impl FixedPolicy {
    pub fn new(action: usize) -> Self {
        FixedPolicy { action }
    }
}

impl<S> Policy<S> for FixedPolicy {
    fn select_action(&mut self, _state: &S) -> usize {
        self.action
    }

    fn name(&self) -> &str {
        "Fixed"
    }
}
