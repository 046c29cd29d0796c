//! Dream Simulation Engine
//!
//! Fixed-increment simulator for speculative execution as a capacity policy on
//! a single-server queue.
//!
//! ## Model
//!
//! ```text
//! arrivals ~ Poisson(λ·dt)
//!     │
//!     ▼
//! service s ~ Exp(μ) ──► s > τ ? τ + min(s-τ, s2) : s   (speculation)
//!     │
//!     ▼
//! FIFO queue drained at rate 1 ──► leftover = idle time
//!                                        │
//!     ρ_τ = min(0.999, λ·E[S_τ]) ──► budget = β(1-ρ_τ)·dt
//!                                        │
//!                                        ▼
//!                         dream work = min(idle, budget)
//! ```
//!
//! The [`scheduler::DreamScheduler`] drives any [`env::Environment`] (the fluid
//! [`server::SpeculativeServer`] or the discrete [`env::FailureRepairEnv`])
//! under a [`policies::Policy`].

pub mod budget;
pub mod dream;
pub mod env;
pub mod error;
pub mod experiment;
pub mod metrics;
pub mod policies;
pub mod sampler;
pub mod scheduler;
pub mod server;
pub mod speculation;
pub mod types;
pub mod utilization;

pub use budget::idle_budget;
pub use env::{EnvConfig, Environment, FailureRepairEnv, Observation};
pub use error::{Result, SimError};
pub use policies::{EpsilonGreedyBandit, FixedPolicy, Learner, Policy, QLearningAgent, QLearningConfig, ReactiveAgent};
pub use scheduler::DreamScheduler;
pub use server::SpeculativeServer;
pub use types::{MetricsSnapshot, ServerConfig, TickRecord, TickReport};
