//! Match coverage of the imports against the catalogue.

use crate::agricultural::Category;
use crate::code::CanonicalCode;
use crate::error::Result;
use crate::store::{CATALOGUE_TABLE, IMPORTS_TABLE, Store};
use rusqlite::params;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Coverage {
    pub distinct_codes: usize,
    pub matched_codes: usize,
    pub unmatched_codes: usize,
    /// Rows carrying a code.
    pub total_rows: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    /// Rows with no code at all; never part of the percentages.
    pub rows_without_code: usize,
}

impl Coverage {
    /// Matched share of distinct codes, 0 to 100. An empty imports table is
    /// fully matched.
    pub fn match_percentage(&self) -> f64 {
        percentage(self.matched_codes, self.distinct_codes)
    }

    /// Matched share of rows.
    pub fn row_match_percentage(&self) -> f64 {
        percentage(self.matched_rows, self.total_rows)
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 100.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}

/// Deepest catalogue level that still knows an unmatched code's family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HierarchyLevel {
    Subheading,
    Heading,
    Chapter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedCode {
    pub code: i64,
    pub rows: usize,
    pub sample_description: Option<String>,
    pub nearest: Option<HierarchyLevel>,
    pub category: Option<&'static str>,
}

/// The catalogue side of the join. An absent catalogue behaves as empty.
fn catalogue_source(store: &Store) -> Result<&'static str> {
    if store.has_catalogue()? {
        Ok(CATALOGUE_TABLE)
    } else {
        warn!("No catalogue table, every code counts as unmatched");
        Ok("(SELECT NULL AS code, NULL AS chapter, NULL AS heading, NULL AS subheading WHERE 0)")
    }
}

/// Distinct-code and row-level coverage.
///
/// Uses EXISTS rather than a join so duplicate catalogue rows cannot inflate
/// the counts.
pub fn coverage(store: &Store) -> Result<Coverage> {
    let catalogue = catalogue_source(store)?;
    let cov = store.conn().query_row(
        &format!(
            "SELECT
                COUNT(DISTINCT i.code),
                COUNT(DISTINCT CASE WHEN m.hit THEN i.code END),
                COUNT(i.code),
                COALESCE(SUM(CASE WHEN m.hit THEN 1 ELSE 0 END), 0),
                COUNT(*) - COUNT(i.code)
             FROM {IMPORTS_TABLE} i
             LEFT JOIN (
                SELECT DISTINCT i2.code AS code, 1 AS hit
                FROM {IMPORTS_TABLE} i2
                WHERE EXISTS (SELECT 1 FROM {catalogue} c WHERE c.code = i2.code)
             ) m ON m.code = i.code"
        ),
        [],
        |row| {
            let distinct_codes: usize = row.get(0)?;
            let matched_codes: usize = row.get(1)?;
            let total_rows: usize = row.get(2)?;
            let matched_rows: usize = row.get(3)?;
            Ok(Coverage {
                distinct_codes,
                matched_codes,
                unmatched_codes: distinct_codes - matched_codes,
                total_rows,
                matched_rows,
                unmatched_rows: total_rows - matched_rows,
                rows_without_code: row.get(4)?,
            })
        },
    )?;

    info!(
        distinct = cov.distinct_codes,
        matched = cov.matched_codes,
        unmatched = cov.unmatched_codes,
        pct = cov.match_percentage(),
        row_pct = cov.row_match_percentage(),
        "Reconciliation coverage"
    );
    if cov.rows_without_code > 0 {
        warn!(rows = cov.rows_without_code, "Import rows without a tariff code");
    }
    Ok(cov)
}

/// Unmatched codes, most frequent first. `limit` of `None` returns them all.
pub fn unmatched_codes(store: &Store, limit: Option<usize>) -> Result<Vec<UnmatchedCode>> {
    let catalogue = catalogue_source(store)?;
    let limit = limit.map_or(-1, |n| n as i64);

    let mut stmt = store.conn().prepare(&format!(
        "SELECT i.code, COUNT(*) AS n, MIN(i.description)
         FROM {IMPORTS_TABLE} i
         WHERE i.code IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM {catalogue} c WHERE c.code = i.code)
         GROUP BY i.code
         ORDER BY n DESC, i.code
         LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, usize>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (code, count, sample) in rows {
        out.push(UnmatchedCode {
            code,
            rows: count,
            sample_description: sample,
            nearest: nearest_level(store, catalogue, code)?,
            category: Category::from_code(code).map(Category::tag),
        });
    }
    Ok(out)
}

fn nearest_level(store: &Store, catalogue: &str, code: i64) -> Result<Option<HierarchyLevel>> {
    let Some(canonical) = CanonicalCode::from_value(code) else {
        return Ok(None);
    };
    let levels = [
        (HierarchyLevel::Subheading, "subheading", canonical.subheading),
        (HierarchyLevel::Heading, "heading", canonical.heading),
        (HierarchyLevel::Chapter, "chapter", canonical.chapter),
    ];
    for (level, column, value) in levels {
        let found: bool = store.conn().query_row(
            &format!("SELECT EXISTS (SELECT 1 FROM {catalogue} WHERE {column} = ?1)"),
            params![value],
            |row| row.get(0),
        )?;
        if found {
            return Ok(Some(level));
        }
    }
    Ok(None)
}
