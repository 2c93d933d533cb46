//! Controller error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The requested state change is not in the transition table
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A run is already in flight on this controller
    #[error("Replay already running")]
    AlreadyRunning,

    /// The operation needs an active run
    #[error("No replay in progress")]
    NotRunning,

    /// The session has no steps to replay
    #[error("Session '{0}' contains no steps")]
    EmptySession(String),
}
