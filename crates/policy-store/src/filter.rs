//! Filter resolution
//!
//! A [`Filter`] selects a subset of stored rules. Every variant except the
//! query delegate resolves into a [`Predicate`], which renders a WHERE clause
//! with bound parameters.

use crate::error::AdapterError;
use rule_codec::{RuleRow, COLUMNS, FIELD_COLUMNS, PTYPE_COLUMN};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by a query delegate
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Custom query: receives the connection, table name, and column list, and
/// returns the matching rows itself
pub type QueryDelegate = Box<
    dyn for<'c> Fn(
            &'c mut SqliteConnection,
            &'c str,
            &'c [&'static str],
        ) -> BoxFuture<'c, Result<Vec<RuleRow>, sqlx::Error>>
        + Send
        + Sync,
>;

/// Constraint on a contiguous range of positional fields
///
/// Values at positions `field_index..field_index + field_values.len()` are
/// matched; empty values are wildcards. Positions past `v5` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionalFilter {
    pub ptype: String,
    pub field_index: usize,
    pub field_values: Vec<String>,
}

/// Column-name to value constraints, paired by index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFilter {
    pub fields: Vec<String>,
    pub values: Vec<String>,
}

/// Selection of stored rules
pub enum Filter {
    /// Predicate text appended verbatim after `WHERE`; not escaped
    Raw(String),
    /// Positional field range
    Positional(PositionalFilter),
    /// Explicit column constraints
    Named(NamedFilter),
    /// Caller-supplied query
    Delegate(QueryDelegate),
}

impl Filter {
    /// Raw WHERE-clause filter
    pub fn raw(predicate: impl Into<String>) -> Self {
        Filter::Raw(predicate.into())
    }

    /// Positional filter starting at `field_index`
    pub fn positional<S: Into<String>>(
        ptype: &str,
        field_index: usize,
        field_values: impl IntoIterator<Item = S>,
    ) -> Self {
        Filter::Positional(PositionalFilter {
            ptype: ptype.to_string(),
            field_index,
            field_values: field_values.into_iter().map(Into::into).collect(),
        })
    }

    /// Named filter from `(column, value)` pairs
    pub fn named<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let (fields, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Filter::Named(NamedFilter { fields, values })
    }

    /// Filter backed by a custom query
    pub fn delegate<F>(query: F) -> Self
    where
        F: for<'c> Fn(
                &'c mut SqliteConnection,
                &'c str,
                &'c [&'static str],
            ) -> BoxFuture<'c, Result<Vec<RuleRow>, sqlx::Error>>
            + Send
            + Sync
            + 'static,
    {
        Filter::Delegate(Box::new(query))
    }

    /// Resolve into a predicate, or hand back the delegate
    pub(crate) fn resolve(&self) -> Result<Resolved<'_>, AdapterError> {
        match self {
            Filter::Raw(sql) => Ok(Resolved::Predicate(Predicate::Raw(sql.clone()))),
            Filter::Positional(p) => Ok(Resolved::Predicate(Predicate::positional(
                &p.ptype,
                p.field_index,
                &p.field_values,
            ))),
            Filter::Named(named) => named.to_predicate().map(Resolved::Predicate),
            Filter::Delegate(query) => Ok(Resolved::Delegate(query)),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Raw(sql) => f.debug_tuple("Raw").field(sql).finish(),
            Filter::Positional(p) => f.debug_tuple("Positional").field(p).finish(),
            Filter::Named(n) => f.debug_tuple("Named").field(n).finish(),
            Filter::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

impl From<PositionalFilter> for Filter {
    fn from(filter: PositionalFilter) -> Self {
        Filter::Positional(filter)
    }
}

impl From<NamedFilter> for Filter {
    fn from(filter: NamedFilter) -> Self {
        Filter::Named(filter)
    }
}

/// Dynamic filter input
///
/// A string is a raw predicate, an object with `fields`/`values` a named
/// filter, an object with `field_index` a positional filter.
impl TryFrom<Value> for Filter {
    type Error = AdapterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::String(sql) = value {
            return Ok(Filter::Raw(sql));
        }

        let invalid = |e: serde_json::Error| AdapterError::InvalidFilter(e.to_string());

        if value.get("fields").is_some() || value.get("values").is_some() {
            serde_json::from_value::<NamedFilter>(value)
                .map(Filter::Named)
                .map_err(invalid)
        } else if value.get("field_index").is_some() {
            serde_json::from_value::<PositionalFilter>(value)
                .map(Filter::Positional)
                .map_err(invalid)
        } else {
            Err(AdapterError::InvalidFilter(format!(
                "unsupported filter shape: {value}"
            )))
        }
    }
}

impl NamedFilter {
    fn to_predicate(&self) -> Result<Predicate, AdapterError> {
        if self.fields.len() != self.values.len() {
            return Err(AdapterError::InvalidFilter(format!(
                "{} field names for {} values",
                self.fields.len(),
                self.values.len()
            )));
        }

        let mut conditions = Vec::with_capacity(self.fields.len());
        for (field, value) in self.fields.iter().zip(&self.values) {
            let column = COLUMNS
                .iter()
                .find(|c| **c == field.as_str())
                .copied()
                .ok_or_else(|| AdapterError::InvalidFilter(format!("unknown column {field:?}")))?;
            conditions.push(Condition::matching(column, Some(value.as_str())));
        }

        Ok(Predicate::Conditions(conditions))
    }
}

/// Outcome of resolving a filter
pub(crate) enum Resolved<'f> {
    Predicate(Predicate),
    Delegate(&'f QueryDelegate),
}

/// Single column constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Condition {
    /// `column = value`
    Equals(&'static str, String),
    /// Column holds no value (NULL or empty string)
    Absent(&'static str),
}

impl Condition {
    fn matching(column: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => Condition::Equals(column, v.to_string()),
            _ => Condition::Absent(column),
        }
    }
}

/// WHERE clause of a rule query
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
    /// Every row
    All,
    /// Verbatim SQL
    Raw(String),
    /// Conjunction of column constraints
    Conditions(Vec<Condition>),
}

impl Predicate {
    /// Rule type plus exact match on the first `width` fields of `row`
    pub(crate) fn exact(row: &RuleRow, width: usize) -> Self {
        let mut conditions = vec![Condition::Equals(PTYPE_COLUMN, row.ptype.clone())];
        for (position, column) in FIELD_COLUMNS.iter().copied().enumerate().take(width) {
            conditions.push(Condition::matching(column, row.value(position)));
        }
        Predicate::Conditions(conditions)
    }

    /// Rule type plus the non-empty values of a positional range
    pub(crate) fn positional(ptype: &str, field_index: usize, field_values: &[String]) -> Self {
        let mut conditions = vec![Condition::Equals(PTYPE_COLUMN, ptype.to_string())];
        for (position, column) in FIELD_COLUMNS.iter().copied().enumerate().skip(field_index) {
            match field_values.get(position - field_index) {
                Some(value) if !value.is_empty() => {
                    conditions.push(Condition::Equals(column, value.clone()));
                }
                _ => {}
            }
        }
        Predicate::Conditions(conditions)
    }

    /// Append the WHERE clause, if any
    pub(crate) fn push_where(&self, query: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::All => {}
            Predicate::Raw(sql) => {
                query.push(" WHERE ").push(sql);
            }
            Predicate::Conditions(conditions) if conditions.is_empty() => {}
            Predicate::Conditions(conditions) => {
                query.push(" WHERE ");
                for (i, condition) in conditions.iter().enumerate() {
                    if i > 0 {
                        query.push(" AND ");
                    }
                    match condition {
                        Condition::Equals(column, value) => {
                            query.push(*column).push(" = ").push_bind(value.clone());
                        }
                        Condition::Absent(column) => {
                            query.push(format!("({column} IS NULL OR {column} = '')"));
                        }
                    }
                }
            }
        }
    }
}
