//! Error types for the treino_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for treino_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// User input rejected; no state was changed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session event not allowed in the current phase
    #[error("Cannot apply {event} while session is {from}")]
    InvalidTransition { from: String, event: String },

    /// Workout id not present in the catalog
    #[error("Unknown workout: {0}")]
    UnknownWorkout(String),

    /// Exercise id not part of the active workout
    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    /// No session slot to act on
    #[error("No active workout; run `treino start <WORKOUT>` first")]
    NoActiveSession,

    /// Delivery of a finished workout to the backend failed
    #[error("Send error: {0}")]
    Send(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
