//! Policy Adapter Implementation

use crate::error::AdapterError;
use crate::filter::{Filter, Predicate, Resolved};
use crate::query;
use crate::settings::StoreConfig;
use policy_model::{PolicyModel, PERSISTED_SECTIONS};
use rule_codec::{RuleRow, COLUMNS};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Stores policy rules in one table over a single SQLite connection
///
/// Every operation takes `&mut self`: the connection and the filtered flag
/// are shared mutable state. Wrap the adapter in a `tokio::sync::Mutex` to
/// share it between tasks.
pub struct PolicyAdapter {
    /// Connection held for the adapter's lifetime
    conn: SqliteConnection,
    /// Rule table name, validated as a plain identifier
    table: String,
    /// Whether the last load was partial
    filtered: bool,
}

impl PolicyAdapter {
    /// Connect using a store configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self, AdapterError> {
        info!("Connecting policy store to {}", config.database_url);

        let conn = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .connect()
            .await?;

        let mut adapter = Self::new(conn, &config.table_name)?;
        if config.create_table {
            adapter.init_table().await?;
        }

        Ok(adapter)
    }

    /// Wrap an open connection
    pub fn new(conn: SqliteConnection, table_name: &str) -> Result<Self, AdapterError> {
        validate_table_name(table_name)?;

        Ok(Self {
            conn,
            table: table_name.to_string(),
            filtered: false,
        })
    }

    /// Create the rule table if it does not exist
    pub async fn init_table(&mut self) -> Result<(), AdapterError> {
        query::create_table(&mut self.conn, &self.table).await?;
        info!("Rule table {} ready", self.table);
        Ok(())
    }

    /// Rule table name
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Underlying connection
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Whether the loaded rule set is known to be partial
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Set the filtered flag
    pub fn set_filtered(&mut self, filtered: bool) {
        self.filtered = filtered;
    }

    /// Load every stored rule into the model
    pub async fn load_policy<M>(&mut self, model: &mut M) -> Result<(), AdapterError>
    where
        M: PolicyModel + ?Sized,
    {
        let rows = query::select_rows(&mut self.conn, &self.table, &Predicate::All).await?;
        Self::feed(model, &rows)?;
        self.filtered = false;

        info!("Loaded {} policy rules from {}", rows.len(), self.table);
        Ok(())
    }

    /// Load only the rules selected by a filter and mark the adapter filtered
    pub async fn load_filtered_policy<M>(
        &mut self,
        model: &mut M,
        filter: &Filter,
    ) -> Result<(), AdapterError>
    where
        M: PolicyModel + ?Sized,
    {
        let rows = match filter.resolve()? {
            Resolved::Predicate(predicate) => {
                query::select_rows(&mut self.conn, &self.table, &predicate).await?
            }
            Resolved::Delegate(delegate) => {
                let columns: &[&str] = &COLUMNS;
                delegate(&mut self.conn, self.table.as_str(), columns).await?
            }
        };

        if rows.is_empty() {
            warn!("Filtered load matched no rules in {}: {:?}", self.table, filter);
        }
        Self::feed(model, &rows)?;
        self.filtered = true;

        info!("Loaded {} filtered policy rules from {}", rows.len(), self.table);
        Ok(())
    }

    /// Persist every rule of the model's policy and grouping sections
    ///
    /// Existing rows are kept; clear the table first to replace it wholesale.
    pub async fn save_policy<M>(&mut self, model: &M) -> Result<(), AdapterError>
    where
        M: PolicyModel + ?Sized,
    {
        let mut rows = Vec::new();
        for sec in PERSISTED_SECTIONS {
            for (ptype, rules) in model.policies(sec) {
                for rule in rules {
                    rows.push(RuleRow::encode(ptype, rule)?);
                }
            }
        }

        let mut tx = self.conn.begin().await?;
        let saved = query::insert_rows(&mut tx, &self.table, &rows).await?;
        tx.commit().await?;

        info!("Saved {} policy rules to {}", saved, self.table);
        Ok(())
    }

    /// Insert one rule
    pub async fn add_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), AdapterError> {
        let row = RuleRow::encode(ptype, rule)?;
        query::insert_rows(&mut self.conn, &self.table, std::slice::from_ref(&row)).await?;

        debug!("Added {} rule to section {}: {:?}", ptype, sec, rule);
        Ok(())
    }

    /// Insert a batch of rules; either all of them are stored or none
    pub async fn add_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<(), AdapterError> {
        let rows = Self::encode_all(ptype, rules)?;

        let mut tx = self.conn.begin().await?;
        let added = query::insert_rows(&mut tx, &self.table, &rows).await?;
        tx.commit().await?;

        debug!("Added {} {} rules to section {}", added, ptype, sec);
        Ok(())
    }

    /// Delete rows equal to the rule on every given field
    pub async fn remove_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<u64, AdapterError> {
        let row = RuleRow::encode(ptype, rule)?;
        let removed =
            query::delete_rows(&mut self.conn, &self.table, &Predicate::exact(&row, rule.len()))
                .await?;

        debug!("Removed {} {} rows from section {}", removed, ptype, sec);
        Ok(removed)
    }

    /// Delete a batch of rules in one transaction
    pub async fn remove_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<u64, AdapterError> {
        let rows = Self::encode_all(ptype, rules)?;

        let mut tx = self.conn.begin().await?;
        let mut removed = 0;
        for (row, rule) in rows.iter().zip(rules) {
            removed +=
                query::delete_rows(&mut tx, &self.table, &Predicate::exact(row, rule.len()))
                    .await?;
        }
        tx.commit().await?;

        debug!("Removed {} {} rows from section {}", removed, ptype, sec);
        Ok(removed)
    }

    /// Delete rows whose fields from `field_index` on match the non-empty
    /// `field_values`
    pub async fn remove_filtered_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<u64, AdapterError> {
        let predicate = Predicate::positional(ptype, field_index, field_values);
        let removed = query::delete_rows(&mut self.conn, &self.table, &predicate).await?;

        debug!(
            "Removed {} {} rows from section {} matching {:?} at {}",
            removed, ptype, sec, field_values, field_index
        );
        Ok(removed)
    }

    /// Overwrite rows equal to `old_rule` with the fields of `new_rule`
    ///
    /// Columns past the end of `new_rule` keep their stored values.
    pub async fn update_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        old_rule: &[String],
        new_rule: &[String],
    ) -> Result<u64, AdapterError> {
        let updated =
            Self::patch_rule(&mut self.conn, &self.table, ptype, old_rule, new_rule).await?;

        debug!("Updated {} {} rows in section {}", updated, ptype, sec);
        Ok(updated)
    }

    /// Apply `old_rules[i] -> new_rules[i]` for every pair in one transaction
    pub async fn update_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<u64, AdapterError> {
        if old_rules.len() != new_rules.len() {
            return Err(AdapterError::MismatchedUpdate {
                old: old_rules.len(),
                new: new_rules.len(),
            });
        }

        let mut tx = self.conn.begin().await?;
        let mut updated = 0;
        for (old_rule, new_rule) in old_rules.iter().zip(new_rules) {
            updated += Self::patch_rule(&mut tx, &self.table, ptype, old_rule, new_rule).await?;
        }
        tx.commit().await?;

        debug!("Updated {} {} rows in section {}", updated, ptype, sec);
        Ok(updated)
    }

    /// Replace the rows matching a positional filter with `new_policies`
    ///
    /// Returns the replaced rules, rule type stripped, as they were before
    /// the replacement.
    pub async fn update_filtered_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        new_policies: &[Vec<String>],
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>, AdapterError> {
        let rows = Self::encode_all(ptype, new_policies)?;
        let predicate = Predicate::positional(ptype, field_index, field_values);

        let mut tx = self.conn.begin().await?;
        let displaced = query::select_rows(&mut tx, &self.table, &predicate).await?;
        query::delete_rows(&mut tx, &self.table, &predicate).await?;
        query::insert_rows(&mut tx, &self.table, &rows).await?;
        tx.commit().await?;

        debug!(
            "Replaced {} {} rows in section {} with {} rules",
            displaced.len(),
            ptype,
            sec,
            rows.len()
        );
        Ok(displaced.iter().map(RuleRow::decode_rule).collect())
    }

    fn encode_all(ptype: &str, rules: &[Vec<String>]) -> Result<Vec<RuleRow>, AdapterError> {
        rules
            .iter()
            .map(|rule| RuleRow::encode(ptype, rule).map_err(AdapterError::from))
            .collect()
    }

    fn feed<M>(model: &mut M, rows: &[RuleRow]) -> Result<(), AdapterError>
    where
        M: PolicyModel + ?Sized,
    {
        for row in rows {
            model.load_policy_line(&row.decode_line())?;
        }
        Ok(())
    }

    async fn patch_rule(
        conn: &mut SqliteConnection,
        table: &str,
        ptype: &str,
        old_rule: &[String],
        new_rule: &[String],
    ) -> Result<u64, AdapterError> {
        let old = RuleRow::encode(ptype, old_rule)?;
        let new = RuleRow::encode(ptype, new_rule)?;
        let predicate = Predicate::exact(&old, old_rule.len());

        Ok(query::update_rows(conn, table, &predicate, &new, new_rule.len()).await?)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn validate_table_name(name: &str) -> Result<(), AdapterError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AdapterError::InvalidTableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_model::MemoryModel;

    fn rule(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    async fn adapter() -> PolicyAdapter {
        PolicyAdapter::connect(&StoreConfig::in_memory()).await.unwrap()
    }

    async fn count(adapter: &mut PolicyAdapter) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}", adapter.table_name());
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(adapter.connection())
            .await
            .unwrap()
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("casbin_rule").is_ok());
        assert!(validate_table_name("_rules2").is_ok());

        for name in ["", "2rules", "casbin_rule; DROP TABLE x", "rules.v0"] {
            assert!(matches!(
                validate_table_name(name),
                Err(AdapterError::InvalidTableName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_add_and_load() {
        let mut adapter = adapter().await;
        adapter
            .add_policy("p", "p", &rule(&["alice", "data1", "read"]))
            .await
            .unwrap();
        adapter
            .add_policy("g", "g", &rule(&["alice", "data2_admin"]))
            .await
            .unwrap();

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();

        assert!(model.has_policy("p", "p", &rule(&["alice", "data1", "read"])));
        assert!(model.has_policy("g", "g", &rule(&["alice", "data2_admin"])));
        assert!(!adapter.is_filtered());
    }

    #[tokio::test]
    async fn test_add_policies_rejects_wide_rule_before_insert() {
        let mut adapter = adapter().await;
        let rules = vec![
            rule(&["alice", "data1", "read"]),
            rule(&["a", "b", "c", "d", "e", "f", "g"]),
        ];

        let result = adapter.add_policies("p", "p", &rules).await;
        assert!(matches!(result, Err(AdapterError::Codec(_))));
        assert_eq!(count(&mut adapter).await, 0);
    }

    #[tokio::test]
    async fn test_remove_policy_is_exact() {
        let mut adapter = adapter().await;
        adapter
            .add_policies(
                "p",
                "p",
                &[rule(&["alice", "data1", "read"]), rule(&["alice", "data1", "write"])],
            )
            .await
            .unwrap();

        let removed = adapter
            .remove_policy("p", "p", &rule(&["alice", "data1", "read"]))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let removed = adapter
            .remove_policy("p", "g", &rule(&["alice", "data1", "write"]))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(count(&mut adapter).await, 1);
    }

    #[tokio::test]
    async fn test_update_policies_mismatch_has_no_effect() {
        let mut adapter = adapter().await;
        adapter
            .add_policy("p", "p", &rule(&["alice", "data1", "read"]))
            .await
            .unwrap();

        let result = adapter
            .update_policies("p", "p", &[rule(&["alice", "data1", "read"])], &[])
            .await;
        assert!(matches!(
            result,
            Err(AdapterError::MismatchedUpdate { old: 1, new: 0 })
        ));

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();
        assert!(model.has_policy("p", "p", &rule(&["alice", "data1", "read"])));
    }

    #[tokio::test]
    async fn test_filtered_flag_round_trip() {
        let mut adapter = adapter().await;
        adapter.set_filtered(true);
        assert!(adapter.is_filtered());

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();
        assert!(!adapter.is_filtered());
    }

    #[tokio::test]
    async fn test_custom_table_name() {
        let config = StoreConfig {
            table_name: "access_rules".to_string(),
            ..StoreConfig::in_memory()
        };
        let mut adapter = PolicyAdapter::connect(&config).await.unwrap();
        adapter
            .add_policy("p", "p", &rule(&["alice", "data1", "read"]))
            .await
            .unwrap();

        assert_eq!(adapter.table_name(), "access_rules");
        assert_eq!(count(&mut adapter).await, 1);
    }
}
