use super::{IMPORTS_TABLE, Store, TableRebuild, columns, count_rows};
use crate::error::{Error, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

/// One customs declaration line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportRecord {
    pub declaration_date: Option<String>,
    pub declarant: Option<String>,
    pub country: Option<String>,
    pub code: Option<i64>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub total_payable: Option<f64>,
    /// Which source file produced the row.
    pub source_file: String,
}

impl ImportRecord {
    /// Total payable divided by quantity; `None` when the quantity is
    /// missing or zero.
    pub fn unit_price(&self) -> Option<f64> {
        match (self.total_payable, self.quantity) {
            (Some(total), Some(qty)) if qty != 0.0 => Some(total / qty),
            _ => None,
        }
    }
}

/// A column-level change to an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    Add { name: String, sql_type: String },
    Rename { from: String, to: String },
    /// New column order. Must name every column exactly once.
    Reorder(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitPriceStats {
    pub total_rows: usize,
    pub with_price: usize,
    pub without_price: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

pub(crate) fn create_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {IMPORTS_TABLE} (
                declaration_date TEXT,
                declarant TEXT,
                country TEXT,
                code INTEGER,
                description TEXT,
                quantity REAL,
                unit TEXT,
                unit_price REAL,
                total_payable REAL,
                source_file TEXT NOT NULL
            )"
        ),
        [],
    )?;
    conn.execute(
        &format!("CREATE INDEX IF NOT EXISTS idx_imports_code ON {IMPORTS_TABLE}(code)"),
        [],
    )?;
    Ok(())
}

/// Quote an identifier for use in generated DDL.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl Store {
    /// Append a batch of declaration lines in one transaction.
    pub fn append_imports(&self, records: &[ImportRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {IMPORTS_TABLE}
                    (declaration_date, declarant, country, code, description,
                     quantity, unit, unit_price, total_payable, source_file)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for r in records {
                stmt.execute(params![
                    r.declaration_date,
                    r.declarant,
                    r.country,
                    r.code,
                    r.description,
                    r.quantity,
                    r.unit,
                    r.unit_price(),
                    r.total_payable,
                    r.source_file,
                ])?;
            }
        }
        tx.commit()?;
        info!(rows = records.len(), "Import records appended");
        Ok(records.len())
    }

    /// Recompute `unit_price` for every row, adding the column if an older
    /// table lacks it.
    pub fn compute_unit_price(&self) -> Result<UnitPriceStats> {
        let existing = columns(&self.conn, IMPORTS_TABLE)?;
        if !existing.iter().any(|c| c == "unit_price") {
            self.conn.execute(
                &format!("ALTER TABLE {IMPORTS_TABLE} ADD COLUMN unit_price REAL"),
                [],
            )?;
            info!("Added unit_price column");
        }

        self.conn.execute(
            &format!(
                "UPDATE {IMPORTS_TABLE}
                 SET unit_price = CASE
                     WHEN quantity IS NOT NULL AND quantity != 0
                     THEN total_payable / quantity
                     ELSE NULL
                 END"
            ),
            [],
        )?;

        let stats = self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(unit_price),
                        MIN(unit_price), MAX(unit_price), AVG(unit_price)
                 FROM {IMPORTS_TABLE}"
            ),
            [],
            |row| {
                let total_rows: usize = row.get(0)?;
                let with_price: usize = row.get(1)?;
                Ok(UnitPriceStats {
                    total_rows,
                    with_price,
                    without_price: total_rows - with_price,
                    min: row.get(2)?,
                    max: row.get(3)?,
                    avg: row.get(4)?,
                })
            },
        )?;
        info!(
            rows = stats.total_rows,
            with_price = stats.with_price,
            without_price = stats.without_price,
            "Unit price computed"
        );
        Ok(stats)
    }

    /// Apply column changes to the imports table through a staging table.
    /// Returns `false` when the plan leaves the schema as it is.
    pub fn evolve_imports(&self, changes: &[SchemaChange]) -> Result<bool> {
        evolve_table(&self.conn, IMPORTS_TABLE, changes)
    }
}

/// Column as it will appear in the rebuilt table.
#[derive(Debug, Clone)]
struct PlannedColumn {
    name: String,
    sql_type: String,
    /// Expression selecting the value from the current table.
    source: Option<String>,
}

fn current_columns(conn: &Connection, table: &str) -> Result<Vec<PlannedColumn>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt.query_map([], |row| {
        let name: String = row.get(1)?;
        let sql_type: String = row.get(2)?;
        Ok(PlannedColumn {
            source: Some(name.clone()),
            name,
            sql_type,
        })
    })?;
    let cols = cols.collect::<rusqlite::Result<Vec<_>>>()?;
    if cols.is_empty() {
        return Err(Error::MissingTable(table.to_string()));
    }
    Ok(cols)
}

fn plan(table: &str, mut cols: Vec<PlannedColumn>, changes: &[SchemaChange]) -> Result<Vec<PlannedColumn>> {
    let position = |cols: &[PlannedColumn], name: &str| cols.iter().position(|c| c.name == name);

    for change in changes {
        match change {
            SchemaChange::Add { name, sql_type } => {
                if position(&cols, name).is_some() {
                    continue;
                }
                cols.push(PlannedColumn {
                    name: name.clone(),
                    sql_type: sql_type.clone(),
                    source: None,
                });
            }
            SchemaChange::Rename { from, to } => {
                if from == to {
                    continue;
                }
                if position(&cols, to).is_some() {
                    return Err(Error::InvalidSchemaChange(format!(
                        "cannot rename {from} to {to}: column already exists"
                    )));
                }
                let idx = position(&cols, from).ok_or_else(|| Error::UnknownColumn {
                    table: table.to_string(),
                    column: from.clone(),
                })?;
                cols[idx].name = to.clone();
            }
            SchemaChange::Reorder(order) => {
                if order.len() != cols.len() {
                    return Err(Error::InvalidSchemaChange(format!(
                        "reorder names {} columns, table has {}",
                        order.len(),
                        cols.len()
                    )));
                }
                let mut reordered = Vec::with_capacity(cols.len());
                for name in order {
                    let idx = position(&cols, name).ok_or_else(|| Error::UnknownColumn {
                        table: table.to_string(),
                        column: name.clone(),
                    })?;
                    if reordered.iter().any(|c: &PlannedColumn| &c.name == name) {
                        return Err(Error::InvalidSchemaChange(format!(
                            "column {name} listed twice"
                        )));
                    }
                    reordered.push(cols[idx].clone());
                }
                cols = reordered;
            }
        }
    }
    Ok(cols)
}

pub(crate) fn evolve_table(conn: &Connection, table: &str, changes: &[SchemaChange]) -> Result<bool> {
    let current = current_columns(conn, table)?;
    let planned = plan(table, current.clone(), changes)?;

    let unchanged = planned.len() == current.len()
        && planned
            .iter()
            .zip(&current)
            .all(|(p, c)| p.name == c.name && p.source.as_deref() == Some(c.name.as_str()));
    if unchanged {
        info!(table, "Schema unchanged, nothing to rebuild");
        return Ok(false);
    }

    let rows = count_rows(conn, table)?;
    let defs = planned
        .iter()
        .map(|c| format!("{} {}", quote(&c.name), c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    let selects = planned
        .iter()
        .map(|c| c.source.as_deref().map_or_else(|| "NULL".to_string(), quote))
        .collect::<Vec<_>>()
        .join(", ");

    TableRebuild::new(conn, table)
        .expect_rows(rows)
        .run(|conn, staging| {
            conn.execute(&format!("CREATE TABLE {staging} ({defs})"), [])?;
            conn.execute(
                &format!("INSERT INTO {staging} SELECT {selects} FROM {table}"),
                [],
            )?;
            Ok(())
        })?;

    if table == IMPORTS_TABLE && planned.iter().any(|c| c.name == "code") {
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_imports_code ON {IMPORTS_TABLE}(code)"),
            [],
        )?;
    }
    info!(table, rows, columns = planned.len(), "Schema evolved");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: i64, qty: Option<f64>, total: Option<f64>) -> ImportRecord {
        ImportRecord {
            declaration_date: Some("2024-03-01".into()),
            declarant: Some("Floristería Central".into()),
            country: Some("COLOMBIA".into()),
            code: Some(code),
            description: Some("ROSAS FRESCAS".into()),
            quantity: qty,
            unit: Some("KG".into()),
            total_payable: total,
            source_file: "enero.xlsx".into(),
        }
    }

    #[test]
    fn test_unit_price_zero_quantity_is_none() {
        assert_eq!(record(1, Some(0.0), Some(50.0)).unit_price(), None);
        assert_eq!(record(1, None, Some(50.0)).unit_price(), None);
        assert_eq!(record(1, Some(4.0), Some(50.0)).unit_price(), Some(12.5));
    }

    #[test]
    fn test_compute_unit_price_in_store() {
        let store = Store::open_in_memory().unwrap();
        store
            .append_imports(&[
                record(60311000000, Some(10.0), Some(25.0)),
                record(60311000000, Some(0.0), Some(25.0)),
                record(60311000000, None, None),
            ])
            .unwrap();

        let stats = store.compute_unit_price().unwrap();
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.with_price, 1);
        assert_eq!(stats.without_price, 2);
        assert_eq!(stats.max, Some(2.5));
    }

    #[test]
    fn test_unit_price_column_added_when_missing() {
        let store = Store::open_in_memory().unwrap();
        store.conn().execute("DROP TABLE imports", []).unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TABLE imports (code INTEGER, quantity REAL, total_payable REAL, source_file TEXT);
                 INSERT INTO imports VALUES (1, 2.0, 10.0, 'a.xlsx');",
            )
            .unwrap();

        let stats = store.compute_unit_price().unwrap();
        assert_eq!(stats.with_price, 1);
        assert!(store.columns(IMPORTS_TABLE).unwrap().contains(&"unit_price".to_string()));
    }

    #[test]
    fn test_rename_and_reorder_preserve_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .append_imports(&[record(1, Some(1.0), Some(1.0)), record(2, Some(2.0), Some(4.0))])
            .unwrap();

        let mut order: Vec<String> = store.columns(IMPORTS_TABLE).unwrap();
        order.retain(|c| c != "source_file");
        order.insert(0, "source_file".to_string());
        let order: Vec<String> = order
            .into_iter()
            .map(|c| if c == "country" { "origin_country".to_string() } else { c })
            .collect();

        let changed = store
            .evolve_imports(&[
                SchemaChange::Rename {
                    from: "country".into(),
                    to: "origin_country".into(),
                },
                SchemaChange::Reorder(order.clone()),
            ])
            .unwrap();

        assert!(changed);
        assert_eq!(store.columns(IMPORTS_TABLE).unwrap(), order);
        assert_eq!(store.count_rows(IMPORTS_TABLE).unwrap(), 2);
        let country: String = store
            .conn()
            .query_row("SELECT origin_country FROM imports LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(country, "COLOMBIA");
    }

    #[test]
    fn test_noop_plan_skips_rebuild() {
        let store = Store::open_in_memory().unwrap();
        let order = store.columns(IMPORTS_TABLE).unwrap();
        assert!(!store.evolve_imports(&[SchemaChange::Reorder(order)]).unwrap());
        assert!(
            !store
                .evolve_imports(&[SchemaChange::Add {
                    name: "code".into(),
                    sql_type: "INTEGER".into()
                }])
                .unwrap()
        );
    }

    #[test]
    fn test_add_column_fills_null() {
        let store = Store::open_in_memory().unwrap();
        store.append_imports(&[record(1, Some(1.0), Some(1.0))]).unwrap();
        assert!(
            store
                .evolve_imports(&[SchemaChange::Add {
                    name: "transport_mode".into(),
                    sql_type: "TEXT".into()
                }])
                .unwrap()
        );
        let mode: Option<String> = store
            .conn()
            .query_row("SELECT transport_mode FROM imports", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode, None);
    }

    #[test]
    fn test_bad_plan_leaves_table_alone() {
        let store = Store::open_in_memory().unwrap();
        store.append_imports(&[record(1, Some(1.0), Some(1.0))]).unwrap();
        let before = store.columns(IMPORTS_TABLE).unwrap();

        let err = store
            .evolve_imports(&[SchemaChange::Reorder(vec!["code".into()])])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchemaChange(_)));

        let err = store
            .evolve_imports(&[SchemaChange::Rename {
                from: "nope".into(),
                to: "still_nope".into(),
            }])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));
        assert_eq!(store.columns(IMPORTS_TABLE).unwrap(), before);
    }
}
