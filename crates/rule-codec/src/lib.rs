//! Rule Codec
//!
//! Converts policy rule tuples to fixed-width storage rows and storage rows
//! back to the line format the policy engine parses.

mod error;
mod row;

pub use error::CodecError;
pub use row::RuleRow;

/// Maximum number of positional fields a stored rule can carry
pub const MAX_FIELDS: usize = 6;

/// Default table identifier
pub const DEFAULT_TABLE_NAME: &str = "casbin_rule";

/// Rule-type column
pub const PTYPE_COLUMN: &str = "ptype";

/// Positional columns, in order
pub const FIELD_COLUMNS: [&str; MAX_FIELDS] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// Every column of the rule table, in select order
pub const COLUMNS: [&str; MAX_FIELDS + 1] = [PTYPE_COLUMN, "v0", "v1", "v2", "v3", "v4", "v5"];

/// Separator between values of a policy line
pub const LINE_SEPARATOR: &str = ", ";
