//! Error types for the collaborator contracts.

use thiserror::Error;

/// Errors raised by external collaborators.
///
/// Exhaustion of the stepper is not an error: it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The ground-truth stepper failed to produce the next step
    #[error("Stepper error: {0}")]
    Stepper(String),

    /// A detection source or trace could not be read
    #[error("Source error: {0}")]
    Source(String),

    /// Telemetry or trace (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EnvError {
    /// Creates a stepper error.
    pub fn stepper(msg: impl Into<String>) -> Self {
        Self::Stepper(msg.into())
    }

    /// Creates a source error.
    pub fn unreadable(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }
}
