//! In-memory policy model

use crate::line::parse_policy_line;
use crate::{ModelError, PolicyModel, GROUPING_SECTION, POLICY_SECTION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Rule sets keyed by section, then rule type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
}

impl MemoryModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Section a rule type belongs to ("p2" -> "p")
    pub fn section_of(ptype: &str) -> Result<&'static str, ModelError> {
        match ptype.chars().next() {
            Some('p') => Ok(POLICY_SECTION),
            Some('g') => Ok(GROUPING_SECTION),
            _ => Err(ModelError::UnknownSection(ptype.to_string())),
        }
    }

    /// Add a rule, returns false if it was already present
    pub fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        let rules = self
            .sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default();

        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    /// Check whether a rule is present
    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.get_policy(sec, ptype).iter().any(|r| r.as_slice() == rule)
    }

    /// Rules of one rule type
    pub fn get_policy(&self, sec: &str, ptype: &str) -> &[Vec<String>] {
        self.sections
            .get(sec)
            .and_then(|types| types.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of rules across all sections
    pub fn policy_count(&self) -> usize {
        self.sections
            .values()
            .flat_map(|types| types.values())
            .map(Vec::len)
            .sum()
    }
}

impl PolicyModel for MemoryModel {
    fn load_policy_line(&mut self, line: &str) -> Result<(), ModelError> {
        let Some((ptype, fields)) = parse_policy_line(line) else {
            return Ok(());
        };
        if ptype.is_empty() {
            return Err(ModelError::MalformedLine(line.to_string()));
        }

        let sec = Self::section_of(&ptype)?;
        if !self.add_policy(sec, &ptype, fields) {
            debug!("Duplicate rule ignored: {}", line);
        }
        Ok(())
    }

    fn policies(&self, sec: &str) -> Vec<(&str, &[Vec<String>])> {
        self.sections
            .get(sec)
            .map(|types| {
                types
                    .iter()
                    .map(|(ptype, rules)| (ptype.as_str(), rules.as_slice()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
