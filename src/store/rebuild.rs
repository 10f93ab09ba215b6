use super::{count_rows, table_exists};
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{info, warn};

/// Two-phase table replacement: fill a staging table, then swap it in.
///
/// The target table is untouched until the staging table is complete; the
/// swap (drop old, rename staging, recreate indexes) runs in a single
/// transaction.
pub struct TableRebuild<'a> {
    conn: &'a Connection,
    target: String,
    staging: String,
    indexes: Vec<(String, String)>,
    expected_rows: Option<usize>,
}

impl<'a> TableRebuild<'a> {
    pub fn new(conn: &'a Connection, target: &str) -> Self {
        Self {
            conn,
            target: target.to_string(),
            staging: format!("{target}__staging"),
            indexes: Vec::new(),
            expected_rows: None,
        }
    }

    /// Index to create on the target after the swap.
    pub fn index(mut self, name: &str, columns: &str) -> Self {
        self.indexes.push((name.to_string(), columns.to_string()));
        self
    }

    /// Refuse the swap unless the staging table holds exactly `rows` rows.
    pub fn expect_rows(mut self, rows: usize) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    /// Build the staging table with `fill`, which receives the staging table
    /// name, then swap. Returns the row count of the new table.
    pub fn run<F>(self, fill: F) -> Result<usize>
    where
        F: FnOnce(&Connection, &str) -> Result<()>,
    {
        let span = tracing::info_span!("rebuild", table = %self.target);
        let _guard = span.enter();

        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", self.staging), [])?;

        if let Err(e) = fill(self.conn, &self.staging) {
            self.discard_staging();
            return Err(e);
        }

        if !table_exists(self.conn, &self.staging)? {
            return Err(Error::MissingTable(self.staging.clone()));
        }

        let rows = count_rows(self.conn, &self.staging)?;
        if let Some(expected) = self.expected_rows {
            if expected != rows {
                self.discard_staging();
                return Err(Error::RowCountMismatch {
                    table: self.target.clone(),
                    expected,
                    actual: rows,
                });
            }
        }

        if let Err(e) = self.swap() {
            self.discard_staging();
            return Err(e);
        }

        info!(rows, indexes = self.indexes.len(), "Table rebuilt");
        Ok(rows)
    }

    fn swap(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", self.target), [])?;
        tx.execute(
            &format!("ALTER TABLE {} RENAME TO {}", self.staging, self.target),
            [],
        )?;
        for (name, columns) in &self.indexes {
            tx.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {name} ON {}({columns})",
                    self.target
                ),
                [],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn discard_staging(&self) {
        if let Err(e) = self
            .conn
            .execute(&format!("DROP TABLE IF EXISTS {}", self.staging), [])
        {
            warn!(error = %e, staging = %self.staging, "Could not drop staging table");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_target() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE target (a INTEGER, b TEXT);
             INSERT INTO target VALUES (1, 'x'), (2, 'y');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_swap_replaces_table_and_indexes() {
        let conn = conn_with_target();
        let rows = TableRebuild::new(&conn, "target")
            .index("idx_target_b", "b")
            .run(|conn, staging| {
                conn.execute_batch(&format!(
                    "CREATE TABLE {staging} (b TEXT, a INTEGER);
                     INSERT INTO {staging} SELECT b, a FROM target;
                     INSERT INTO {staging} VALUES ('z', 3);"
                ))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(rows, 3);
        assert_eq!(columns(&conn), vec!["b", "a"]);
        assert!(!table_exists(&conn, "target__staging").unwrap());
        let idx: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_target_b'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_failed_fill_keeps_original() {
        let conn = conn_with_target();
        let result = TableRebuild::new(&conn, "target").run(|conn, staging| {
            conn.execute(&format!("CREATE TABLE {staging} (a INTEGER)"), [])?;
            conn.execute(&format!("INSERT INTO {staging} SELECT missing FROM target"), [])?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&conn, "target").unwrap(), 2);
        assert_eq!(columns(&conn), vec!["a", "b"]);
        assert!(!table_exists(&conn, "target__staging").unwrap());
    }

    #[test]
    fn test_row_count_mismatch_aborts_swap() {
        let conn = conn_with_target();
        let result = TableRebuild::new(&conn, "target")
            .expect_rows(2)
            .run(|conn, staging| {
                conn.execute(&format!("CREATE TABLE {staging} AS SELECT * FROM target LIMIT 1"), [])?;
                Ok(())
            });

        assert!(matches!(
            result,
            Err(Error::RowCountMismatch { expected: 2, actual: 1, .. })
        ));
        assert_eq!(count_rows(&conn, "target").unwrap(), 2);
    }

    #[test]
    fn test_builds_missing_target() {
        let conn = Connection::open_in_memory().unwrap();
        let rows = TableRebuild::new(&conn, "fresh")
            .run(|conn, staging| {
                conn.execute(&format!("CREATE TABLE {staging} AS SELECT 1 AS one"), [])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(rows, 1);
        assert!(table_exists(&conn, "fresh").unwrap());
    }

    fn columns(conn: &Connection) -> Vec<String> {
        super::super::columns(conn, "target").unwrap()
    }
}
