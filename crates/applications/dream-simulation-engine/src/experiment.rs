//! Multi-episode experiments on the failure/repair environment

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::env::{Environment, FailureRepairEnv, Observation};
use crate::error::Result;
use crate::metrics::EpisodeMetrics;
use crate::policies::Policy;

/// Result of one episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub episode: usize,
    pub reward: f64,
    #[serde(flatten)]
    pub metrics: EpisodeMetrics,
}

/// Aggregate over a set of episodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub policy_name: String,
    pub episodes: Vec<EpisodeOutcome>,
    pub mean_reward: f64,
    pub mean_throughput: f64,
    pub mean_drop_rate: f64,
    pub mean_mttr: f64,
}

/// Run `episodes` full episodes. Learning hooks fire after every tick and
/// exploration decays once per episode.
pub fn run_episodes<P>(env: &mut FailureRepairEnv, policy: &mut P, episodes: usize) -> Result<ExperimentResult>
where
    P: Policy<Observation>,
{
    info!(policy = policy.name(), episodes, "starting experiment");
    let mut outcomes = Vec::with_capacity(episodes);

    for episode in 0..episodes {
        let mut state = env.reset()?;
        let mut reward = 0.0;
        let mut done = false;

        while !done {
            let action = policy.select_action(&state);
            let transition = env.advance(action, 1.0)?;
            reward += transition.reward;

            if let Some(learner) = policy.learner() {
                learner.update(action, transition.reward);
                learner.learn(&state, action, transition.reward, &transition.state);
            }

            state = transition.state;
            done = transition.done;
        }

        if let Some(learner) = policy.learner() {
            learner.decay();
        }

        outcomes.push(EpisodeOutcome {
            episode,
            reward,
            metrics: EpisodeMetrics::from_env(env),
        });
    }

    let result = ExperimentResult {
        policy_name: policy.name().to_string(),
        mean_reward: mean(outcomes.iter().map(|o| o.reward)),
        mean_throughput: mean(outcomes.iter().map(|o| o.metrics.throughput)),
        mean_drop_rate: mean(outcomes.iter().map(|o| o.metrics.drop_rate)),
        mean_mttr: mean(outcomes.iter().map(|o| o.metrics.mttr)),
        episodes: outcomes,
    };

    info!(
        policy = %result.policy_name,
        mean_reward = result.mean_reward,
        mean_throughput = result.mean_throughput,
        "experiment finished"
    );
    Ok(result)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}
