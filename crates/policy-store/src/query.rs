//! SQL statements against the rule table
//!
//! All functions take a `&mut SqliteConnection` so they run unchanged on the
//! adapter's connection or inside an open transaction.

use crate::filter::Predicate;
use rule_codec::{RuleRow, COLUMNS, FIELD_COLUMNS, MAX_FIELDS};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

/// Rows per INSERT statement; keeps binds under SQLite's 999 parameter limit
const INSERT_CHUNK_ROWS: usize = 128;

/// Create the rule table if it does not exist
pub(crate) async fn create_table(conn: &mut SqliteConnection, table: &str) -> Result<(), sqlx::Error> {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|column| format!("{column} VARCHAR(255)"))
        .collect();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns.join(", ")
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Insert rows with multi-row INSERT statements
pub(crate) async fn insert_rows(
    conn: &mut SqliteConnection,
    table: &str,
    rows: &[RuleRow],
) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;

    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO {table} ({}) ",
            COLUMNS.join(", ")
        ));
        query.push_values(chunk, |mut tuple, row| {
            tuple.push_bind(row.ptype.clone());
            for value in &row.values {
                tuple.push_bind(value.clone());
            }
        });

        inserted += query.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(inserted)
}

/// Select the rows matching a predicate, in storage order
pub(crate) async fn select_rows(
    conn: &mut SqliteConnection,
    table: &str,
    predicate: &Predicate,
) -> Result<Vec<RuleRow>, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM {table}",
        COLUMNS.join(", ")
    ));
    predicate.push_where(&mut query);

    let rows = query
        .build_query_as::<StoredRow>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(StoredRow::into_row).collect())
}

/// Delete the rows matching a predicate
pub(crate) async fn delete_rows(
    conn: &mut SqliteConnection,
    table: &str,
    predicate: &Predicate,
) -> Result<u64, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table}"));
    predicate.push_where(&mut query);

    let result = query.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Overwrite the first `width` positional columns of matching rows
pub(crate) async fn update_rows(
    conn: &mut SqliteConnection,
    table: &str,
    predicate: &Predicate,
    patch: &RuleRow,
    width: usize,
) -> Result<u64, sqlx::Error> {
    let width = width.min(MAX_FIELDS);
    if width == 0 {
        return Ok(0);
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!("UPDATE {table} SET "));
    {
        let mut assignments = query.separated(", ");
        for (column, value) in FIELD_COLUMNS.iter().zip(&patch.values).take(width) {
            assignments
                .push(format!("{column} = "))
                .push_bind_unseparated(value.clone());
        }
    }
    predicate.push_where(&mut query);

    let result = query.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Raw row shape as read from the table
#[derive(sqlx::FromRow)]
struct StoredRow {
    ptype: Option<String>,
    v0: Option<String>,
    v1: Option<String>,
    v2: Option<String>,
    v3: Option<String>,
    v4: Option<String>,
    v5: Option<String>,
}

impl StoredRow {
    fn into_row(self) -> RuleRow {
        RuleRow::from_columns(
            self.ptype,
            [self.v0, self.v1, self.v2, self.v3, self.v4, self.v5],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    async fn memory_table() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        create_table(&mut conn, "casbin_rule").await.unwrap();
        conn
    }

    fn row(ptype: &str, fields: &[&str]) -> RuleRow {
        RuleRow::encode(ptype, fields).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_select() {
        let mut conn = memory_table().await;
        let rows = vec![
            row("p", &["alice", "data1", "read"]),
            row("g", &["alice", "data2_admin"]),
        ];

        let inserted = insert_rows(&mut conn, "casbin_rule", &rows).await.unwrap();
        assert_eq!(inserted, 2);

        let stored = select_rows(&mut conn, "casbin_rule", &Predicate::All).await.unwrap();
        assert_eq!(stored, rows);
    }

    #[tokio::test]
    async fn test_insert_spans_chunks() {
        let mut conn = memory_table().await;
        let rows: Vec<RuleRow> = (0..INSERT_CHUNK_ROWS * 2 + 3)
            .map(|i| {
                let user = format!("user{i}");
                row("p", &[user.as_str(), "data", "read"])
            })
            .collect();

        let inserted = insert_rows(&mut conn, "casbin_rule", &rows).await.unwrap();
        assert_eq!(inserted, rows.len() as u64);
    }

    #[tokio::test]
    async fn test_update_patches_leading_columns() {
        let mut conn = memory_table().await;
        insert_rows(&mut conn, "casbin_rule", &[row("p", &["alice", "data1", "read"])])
            .await
            .unwrap();

        let predicate = Predicate::exact(&row("p", &["alice"]), 1);
        let updated = update_rows(&mut conn, "casbin_rule", &predicate, &row("p", &["bob"]), 1)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let stored = select_rows(&mut conn, "casbin_rule", &Predicate::All).await.unwrap();
        assert_eq!(stored[0].decode_line(), "p, bob, data1, read");
    }

    #[tokio::test]
    async fn test_empty_string_reads_as_absent() {
        let mut conn = memory_table().await;
        sqlx::query("INSERT INTO casbin_rule (ptype, v0, v1, v2) VALUES ('p', 'alice', '', 'read')")
            .execute(&mut conn)
            .await
            .unwrap();

        let predicate = Predicate::exact(&row("p", &["alice", "", "read"]), 3);
        let stored = select_rows(&mut conn, "casbin_rule", &predicate).await.unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value(1), None);
        assert_eq!(stored[0].decode_line(), "p, alice, read");
    }
}
