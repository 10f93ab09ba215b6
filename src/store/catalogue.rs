use super::{CATALOGUE_TABLE, RUNS_TABLE, Store, TableRebuild, table_exists};
use crate::catalogue::Extraction;
use crate::error::Result;
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use tracing::info;

/// A catalogue row as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogueRow {
    pub code: i64,
    pub chapter: u32,
    pub heading: u32,
    pub subheading: u32,
    pub description: String,
    pub tariff_rate: Option<String>,
    pub itbms: f64,
    pub isc: f64,
    pub iccdp: f64,
    pub chapter_name: Option<String>,
    pub display_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogueStats {
    pub total_codes: usize,
    pub chapters: usize,
    pub headings: usize,
    pub subheadings: usize,
    pub named_chapters: usize,
    pub min_code: Option<i64>,
    pub max_code: Option<i64>,
}

/// Bookkeeping for one catalogue extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRun {
    pub source_sha256: String,
    pub pattern_version: u32,
    pub extracted_at: String,
    pub entries: usize,
    pub chapters: usize,
}

const ROW_COLUMNS: &str = "code, chapter, heading, subheading, description, tariff_rate, \
                           itbms, isc, iccdp, chapter_name, display_label";

fn row_to_catalogue(row: &Row<'_>) -> rusqlite::Result<CatalogueRow> {
    Ok(CatalogueRow {
        code: row.get(0)?,
        chapter: row.get(1)?,
        heading: row.get(2)?,
        subheading: row.get(3)?,
        description: row.get(4)?,
        tariff_rate: row.get(5)?,
        itbms: row.get(6)?,
        isc: row.get(7)?,
        iccdp: row.get(8)?,
        chapter_name: row.get(9)?,
        display_label: row.get(10)?,
    })
}

impl Store {
    /// Replace the whole catalogue with a fresh extraction. There is no
    /// incremental write path.
    pub fn replace_catalogue(&self, extraction: &Extraction) -> Result<usize> {
        let rows = TableRebuild::new(&self.conn, CATALOGUE_TABLE)
            .index("idx_catalogue_chapter", "chapter")
            .index("idx_catalogue_heading", "heading")
            .index("idx_catalogue_subheading", "subheading")
            .expect_rows(extraction.entries.len())
            .run(|conn, staging| {
                conn.execute(
                    &format!(
                        "CREATE TABLE {staging} (
                            code INTEGER PRIMARY KEY,
                            chapter INTEGER NOT NULL,
                            heading INTEGER NOT NULL,
                            subheading INTEGER NOT NULL,
                            description TEXT NOT NULL,
                            tariff_rate TEXT,
                            itbms REAL NOT NULL DEFAULT 0,
                            isc REAL NOT NULL DEFAULT 0,
                            iccdp REAL NOT NULL DEFAULT 0,
                            chapter_name TEXT,
                            display_label TEXT
                        )"
                    ),
                    [],
                )?;
                let mut stmt = conn.prepare(&format!(
                    "INSERT INTO {staging} ({ROW_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)"
                ))?;
                for entry in &extraction.entries {
                    stmt.execute(params![
                        entry.code.value,
                        entry.code.chapter,
                        entry.code.heading,
                        entry.code.subheading,
                        entry.description,
                        entry.tariff_rate,
                        entry.itbms,
                        entry.isc,
                        entry.iccdp,
                        extraction.chapter_name(entry.code.chapter),
                    ])?;
                }
                Ok(())
            })?;
        info!(rows, "Catalogue replaced");
        Ok(rows)
    }

    pub fn has_catalogue(&self) -> Result<bool> {
        table_exists(&self.conn, CATALOGUE_TABLE)
    }

    pub fn catalogue_entry(&self, code: i64) -> Result<Option<CatalogueRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM {CATALOGUE_TABLE} WHERE code = ?1"),
                params![code],
                row_to_catalogue,
            )
            .optional()?)
    }

    pub fn catalogue_by_chapter(&self, chapter: u32) -> Result<Vec<CatalogueRow>> {
        self.catalogue_where("chapter", chapter)
    }

    pub fn catalogue_by_heading(&self, heading: u32) -> Result<Vec<CatalogueRow>> {
        self.catalogue_where("heading", heading)
    }

    pub fn catalogue_by_subheading(&self, subheading: u32) -> Result<Vec<CatalogueRow>> {
        self.catalogue_where("subheading", subheading)
    }

    /// Every catalogue row, ordered by code.
    pub fn catalogue_rows(&self) -> Result<Vec<CatalogueRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROW_COLUMNS} FROM {CATALOGUE_TABLE} ORDER BY code"
        ))?;
        let rows = stmt.query_map([], row_to_catalogue)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn catalogue_where(&self, column: &str, value: u32) -> Result<Vec<CatalogueRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROW_COLUMNS} FROM {CATALOGUE_TABLE} WHERE {column} = ?1 ORDER BY code"
        ))?;
        let rows = stmt.query_map(params![value], row_to_catalogue)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn catalogue_stats(&self) -> Result<CatalogueStats> {
        Ok(self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT chapter), COUNT(DISTINCT heading),
                        COUNT(DISTINCT subheading),
                        COUNT(DISTINCT CASE WHEN chapter_name IS NOT NULL THEN chapter END),
                        MIN(code), MAX(code)
                 FROM {CATALOGUE_TABLE}"
            ),
            [],
            |row| {
                Ok(CatalogueStats {
                    total_codes: row.get(0)?,
                    chapters: row.get(1)?,
                    headings: row.get(2)?,
                    subheadings: row.get(3)?,
                    named_chapters: row.get(4)?,
                    min_code: row.get(5)?,
                    max_code: row.get(6)?,
                })
            },
        )?)
    }

    /// Overwrite `display_label` for the given codes in one transaction.
    pub fn set_display_labels(&self, labels: &[(i64, String)]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {CATALOGUE_TABLE} SET display_label = ?1 WHERE code = ?2"
            ))?;
            for (code, label) in labels {
                updated += stmt.execute(params![label, code])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    pub fn record_extraction(&self, run: &ExtractionRun) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {RUNS_TABLE}
                    (source_sha256, pattern_version, extracted_at, entries, chapters)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                run.source_sha256,
                run.pattern_version,
                run.extracted_at,
                run.entries,
                run.chapters,
            ],
        )?;
        Ok(())
    }

    pub fn last_extraction(&self) -> Result<Option<ExtractionRun>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT source_sha256, pattern_version, extracted_at, entries, chapters
                     FROM {RUNS_TABLE} ORDER BY id DESC LIMIT 1"
                ),
                [],
                |row| {
                    Ok(ExtractionRun {
                        source_sha256: row.get(0)?,
                        pattern_version: row.get(1)?,
                        extracted_at: row.get(2)?,
                        entries: row.get(3)?,
                        chapters: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }
}
