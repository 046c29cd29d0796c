//! Error types for the simulation engine

use thiserror::Error;

/// Simulation result type
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while configuring or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid configuration or call argument (μ ≤ 0, dt ≤ 0, empty sample count, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Action index outside the environment's action space
    #[error("Invalid action {action}: environment accepts 0..{num_actions}")]
    InvalidAction { action: usize, num_actions: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-action error
    pub fn invalid_action(action: usize, num_actions: usize) -> Self {
        Self::InvalidAction { action, num_actions }
    }
}
