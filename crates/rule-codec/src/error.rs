//! Codec Error Types

use thiserror::Error;

/// Errors while encoding a rule into a storage row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Rule has more fields than the table has positional columns
    #[error("Rule of type {ptype} has {count} fields, at most {max} can be stored")]
    TooManyFields {
        ptype: String,
        count: usize,
        max: usize,
    },
}
