// src/store/mod.rs

mod catalogue;
mod imports;
mod rebuild;

pub use catalogue::{CatalogueRow, CatalogueStats, ExtractionRun};
pub use imports::{ImportRecord, SchemaChange, UnitPriceStats};
pub use rebuild::TableRebuild;

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::info;

/// Raw customs declaration lines.
pub const IMPORTS_TABLE: &str = "imports";
/// Tariff codes read from the catalogue document.
pub const CATALOGUE_TABLE: &str = "tariff_catalogue";
/// Agricultural subset of the imports, enriched from the catalogue.
pub const AGRICULTURAL_TABLE: &str = "agricultural_imports";
/// One row per catalogue extraction.
pub const RUNS_TABLE: &str = "extraction_runs";

/// Handle on the relational store. Opened once per invocation and passed
/// explicitly to every stage.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        info!(path = %db_path.display(), "Database opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {RUNS_TABLE} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source_sha256 TEXT NOT NULL,
                    pattern_version INTEGER NOT NULL,
                    extracted_at TEXT NOT NULL,
                    entries INTEGER NOT NULL,
                    chapters INTEGER NOT NULL
                )"
            ),
            [],
        )?;
        imports::create_table(&conn)?;
        Ok(Self { conn })
    }

    /// Release the connection. Dropping the store does the same, this just
    /// surfaces close errors.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        info!("Database closed");
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        table_exists(&self.conn, table)
    }

    pub fn count_rows(&self, table: &str) -> Result<usize> {
        count_rows(&self.conn, table)
    }

    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        columns(&self.conn, table)
    }
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
}

pub(crate) fn columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.collect::<rusqlite::Result<Vec<_>>>()?)
}
