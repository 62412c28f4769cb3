//! Policy Store
//!
//! Persists access-control policy rules in a SQLite table and reloads them
//! into a policy model. Supports partial-field filtered removal, filtered
//! replacement, and filtered loading.

mod adapter;
mod error;
mod filter;
mod query;
mod settings;

pub use adapter::PolicyAdapter;
pub use error::AdapterError;
pub use filter::{BoxFuture, Filter, NamedFilter, PositionalFilter, QueryDelegate};
pub use settings::StoreConfig;

pub use policy_model::{MemoryModel, ModelError, PolicyModel, PERSISTED_SECTIONS};
pub use rule_codec::{CodecError, RuleRow, COLUMNS, DEFAULT_TABLE_NAME};
