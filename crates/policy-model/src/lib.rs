//! Policy Model
//!
//! The boundary between rule storage and the policy-evaluation engine.
//! Storage feeds the engine textual rule lines and reads back its rule
//! groups per section; rule semantics stay on the engine side.

mod line;
mod memory;

pub use line::parse_policy_line;
pub use memory::MemoryModel;

use thiserror::Error;

/// Section holding permission rules
pub const POLICY_SECTION: &str = "p";

/// Section holding role/grouping rules
pub const GROUPING_SECTION: &str = "g";

/// Sections persisted by a full save, in order
pub const PERSISTED_SECTIONS: [&str; 2] = [POLICY_SECTION, GROUPING_SECTION];

/// Errors raised by a model while accepting rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Rule type does not belong to a policy section
    #[error("Unknown policy section for rule type: {0}")]
    UnknownSection(String),

    /// Line could not be interpreted as a rule
    #[error("Malformed policy line: {0}")]
    MalformedLine(String),
}

/// In-memory rule model of a policy engine
pub trait PolicyModel {
    /// Accept one rule line, e.g. `p, alice, data1, read`
    fn load_policy_line(&mut self, line: &str) -> Result<(), ModelError>;

    /// Rule groups of a section as `(ptype, rules)` pairs
    fn policies(&self, sec: &str) -> Vec<(&str, &[Vec<String>])>;
}
