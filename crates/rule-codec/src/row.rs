//! Rule tuple and storage row types

use crate::error::CodecError;
use crate::{LINE_SEPARATOR, MAX_FIELDS};
use serde::{Deserialize, Serialize};

/// A row of the rule table
///
/// `None` is the only representation of "no value at this position".
/// Empty strings coming from either side are folded into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRow {
    pub ptype: String,
    pub values: [Option<String>; MAX_FIELDS],
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl RuleRow {
    /// Encode a rule tuple, assigning `rule[i]` to position `i`
    ///
    /// Positions past the end of the rule are left empty.
    pub fn encode<S: AsRef<str>>(ptype: &str, rule: &[S]) -> Result<Self, CodecError> {
        if rule.len() > MAX_FIELDS {
            return Err(CodecError::TooManyFields {
                ptype: ptype.to_string(),
                count: rule.len(),
                max: MAX_FIELDS,
            });
        }

        let mut values: [Option<String>; MAX_FIELDS] = Default::default();
        for (slot, field) in values.iter_mut().zip(rule) {
            let field: &str = field.as_ref();
            *slot = normalize(Some(field.to_string()));
        }

        Ok(Self {
            ptype: ptype.to_string(),
            values,
        })
    }

    /// Build a row from raw storage columns
    pub fn from_columns(ptype: Option<String>, values: [Option<String>; MAX_FIELDS]) -> Self {
        Self {
            ptype: ptype.unwrap_or_default(),
            values: values.map(normalize),
        }
    }

    /// Value at a position, `None` when empty or out of range
    pub fn value(&self, position: usize) -> Option<&str> {
        self.values.get(position).and_then(|v| v.as_deref())
    }

    /// Populated values in column order, gaps skipped
    ///
    /// Empty strings count as gaps even when the row was built by hand
    /// rather than through [`RuleRow::from_columns`].
    pub fn present_values(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter_map(|v| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    /// Reconstruct the policy line the engine parses, e.g. `p, alice, data1, read`
    pub fn decode_line(&self) -> String {
        let parts: Vec<&str> = std::iter::once(self.ptype.as_str())
            .filter(|p| !p.is_empty())
            .chain(self.present_values())
            .collect();

        parts.join(LINE_SEPARATOR).trim().to_string()
    }

    /// The populated values with the rule type stripped
    pub fn decode_rule(&self) -> Vec<String> {
        self.present_values().map(str::to_string).collect()
    }
}
