//! Policy Store Error Types

use policy_model::ModelError;
use rule_codec::CodecError;
use thiserror::Error;

/// Errors raised by the policy adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Filter input matched none of the recognized shapes
    #[error("Invalid filter type: {0}")]
    InvalidFilter(String),

    /// Failure reported by the database, passed through unchanged
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Rule could not be encoded into a row
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Policy model rejected a loaded rule line
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Batch update received unequal old and new rule lists
    #[error("Mismatched update: {old} old rules, {new} new rules")]
    MismatchedUpdate { old: usize, new: usize },

    /// Table identifier is not a plain SQL identifier
    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for AdapterError {
    fn from(err: config::ConfigError) -> Self {
        AdapterError::Config(err.to_string())
    }
}
