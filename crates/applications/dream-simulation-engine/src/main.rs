//! Dream Simulation Engine CLI
//!
//! Command-line interface for running speculative-queue simulations

use std::fs;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dream_simulation_engine::{
    experiment::run_episodes,
    metrics::summarize,
    types::DREAM_SCENARIOS,
    DreamScheduler, EnvConfig, EpsilonGreedyBandit, FailureRepairEnv, QLearningAgent, QLearningConfig,
    ReactiveAgent, ServerConfig, SpeculativeServer,
};

#[derive(Parser, Debug)]
#[command(name = "dream-sim")]
#[command(about = "Simulate speculative retries and idle-budget dream scheduling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the fluid speculative server under an epsilon-greedy bandit
    Fluid {
        /// Service rate μ
        #[arg(long, default_value_t = 1.0)]
        mu: f64,

        /// Arrival rate λ
        #[arg(long, default_value_t = 0.6)]
        lam: f64,

        /// Speculation timeout τ
        #[arg(long, default_value_t = 0.5)]
        tau: f64,

        /// Idle-budget scale β
        #[arg(long, default_value_t = 0.2)]
        beta: f64,

        /// Monte Carlo samples per ρ_τ estimate
        #[arg(long, default_value_t = 2000)]
        samples: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// JSON server config (overrides the flags above)
        #[arg(long)]
        config: Option<String>,

        /// Tick length
        #[arg(long, default_value_t = 1.0)]
        dt: f64,

        /// Number of ticks
        #[arg(short, long, default_value_t = 50)]
        ticks: usize,

        /// Bandit exploration rate
        #[arg(long, default_value_t = 0.1)]
        eps: f64,

        /// Output JSON file path (optional)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compare Q-learning and reactive agents on the failure/repair environment
    Compare {
        #[arg(short, long, default_value_t = 500)]
        episodes: usize,

        #[arg(long, default_value_t = 10)]
        max_queue: usize,

        #[arg(long, default_value_t = 0.05)]
        fail_prob: f64,

        #[arg(long, default_value_t = 0.2)]
        repair_prob: f64,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Output JSON file path (optional)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dream_sim=info,dream_simulation_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fluid {
            mu,
            lam,
            tau,
            beta,
            samples,
            seed,
            config,
            dt,
            ticks,
            eps,
            output,
        } => {
            let config = match config {
                Some(path) => ServerConfig::from_json_file(&path)
                    .with_context(|| format!("loading server config from {}", path))?,
                None => ServerConfig::new(mu, lam, tau, beta, seed)?.with_samples(samples)?,
            };
            info!(?config, dt, ticks, "fluid run");

            let bandit = EpsilonGreedyBandit::new(DREAM_SCENARIOS.len(), eps, config.seed)?;
            let server = SpeculativeServer::new(config)?;
            let mut scheduler = DreamScheduler::new(server, bandit, dt)?;
            let history = scheduler.run(ticks)?;

            let summary = summarize(&history);
            println!("{}", serde_json::to_string_pretty(&summary)?);

            let (server, bandit) = scheduler.into_parts();
            info!(
                completions = server.completions(),
                arrivals = server.arrivals(),
                speculations = server.speculations(),
                dream_cpu_secs = server.dreams().cpu_secs(),
                dream_events = server.dreams().events(),
                "run complete"
            );
            for (scenario, value) in DREAM_SCENARIOS.iter().zip(bandit.values()) {
                info!(scenario = scenario.name, value, "scenario value estimate");
            }

            write_output(output.as_deref(), &history)?;
        }
        Commands::Compare {
            episodes,
            max_queue,
            fail_prob,
            repair_prob,
            seed,
            output,
        } => {
            let env_config = EnvConfig {
                max_queue,
                fail_prob,
                repair_prob,
                seed,
                ..EnvConfig::default()
            };

            let mut env = FailureRepairEnv::new(env_config.clone())?;
            let mut q_agent = QLearningAgent::new(max_queue, 2, QLearningConfig { seed, ..QLearningConfig::default() })?;
            let q_result = run_episodes(&mut env, &mut q_agent, episodes)?;

            let mut env = FailureRepairEnv::new(env_config)?;
            let mut reactive = ReactiveAgent::new(max_queue);
            let reactive_result = run_episodes(&mut env, &mut reactive, episodes)?;

            println!(
                "{:<12} {:>12} {:>12} {:>12} {:>12}",
                "Policy", "Reward", "Throughput", "Drop rate", "MTTR"
            );
            println!("{}", "-".repeat(64));
            for result in [&q_result, &reactive_result] {
                println!(
                    "{:<12} {:>12.2} {:>12.3} {:>12.3} {:>12.2}",
                    result.policy_name,
                    result.mean_reward,
                    result.mean_throughput,
                    result.mean_drop_rate,
                    result.mean_mttr,
                );
            }

            write_output(output.as_deref(), &[q_result, reactive_result])?;
        }
    }

    Ok(())
}

fn write_output<T: Serialize + ?Sized>(path: Option<&str>, value: &T) -> anyhow::Result<()> {
    if let Some(path) = path {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("writing results to {}", path))?;
        info!(path, "results saved");
    }
    Ok(())
}
