use thiserror::Error;

/// Errors surfaced by the simulation runner.
#[derive(Debug, Error)]
pub enum RunError {
    /// The configuration failed validation; nothing was dispatched.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The run was cancelled (or superseded) before its result was merged.
    #[error("simulation run cancelled")]
    Cancelled,
}
