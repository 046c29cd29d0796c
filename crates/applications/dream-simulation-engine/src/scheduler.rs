//! Scheduling loop: ties an environment to a decision policy
//!
//! The environment is reset once at the start of a run. Each tick:
//! 1. Ask the policy for an action on the current state
//! 2. Advance the environment by `dt` under that action
//! 3. Feed the reward (and transition) back to the policy, if it learns
//! 4. Append the metrics plus `action` and `reward` to the history log
//!
//! Ticks are unconditional: none is retried or skipped, and an environment
//! reporting `done` does not end a fixed-length run.

use tracing::info;

use crate::env::Environment;
use crate::error::{Result, SimError};
use crate::policies::Policy;
use crate::types::TickRecord;

/// Drives `env` under `policy` in fixed `dt` increments
pub struct DreamScheduler<E, P> {
    env: E,
    policy: P,
    dt: f64,
}

impl<E, P> DreamScheduler<E, P>
where
    E: Environment,
    P: Policy<E::State>,
{
    pub fn new(env: E, policy: P, dt: f64) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::config(format!("time step dt must be > 0, got {}", dt)));
        }
        Ok(DreamScheduler { env, policy, dt })
    }

    /// Run `ticks` steps and return the ordered history log
    pub fn run(&mut self, ticks: usize) -> Result<Vec<TickRecord<E::Metrics>>> {
        info!(policy = self.policy.name(), ticks, dt = self.dt, "starting scheduling run");

        let mut history = Vec::with_capacity(ticks);
        let mut state = self.env.reset()?;
        let mut total_reward = 0.0;

        for _ in 0..ticks {
            let action = self.policy.select_action(&state);
            let transition = self.env.advance(action, self.dt)?;

            if let Some(learner) = self.policy.learner() {
                learner.update(action, transition.reward);
                learner.learn(&state, action, transition.reward, &transition.state);
            }

            total_reward += transition.reward;
            history.push(TickRecord {
                metrics: transition.metrics,
                action,
                reward: transition.reward,
            });
            state = transition.state;
        }

        info!(policy = self.policy.name(), ticks, total_reward, "scheduling run finished");
        Ok(history)
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Give back the environment and policy
    pub fn into_parts(self) -> (E, P) {
        (self.env, self.policy)
    }
}
