//! Read-only aggregate queries over the agricultural view and the catalogue.

use crate::error::{Error, Result};
use crate::store::{AGRICULTURAL_TABLE, CATALOGUE_TABLE, IMPORTS_TABLE, Store};
use rusqlite::{Params, Row, params};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RankBy {
    Volume,
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub shipments: usize,
    pub volume: f64,
    pub value: f64,
    pub products: usize,
    pub importers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTotal {
    pub product: Option<String>,
    pub category: String,
    pub volume: f64,
    pub value: f64,
    pub shipments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPoint {
    /// `YYYY-MM`
    pub month: String,
    pub volume: f64,
    /// Quantity-weighted; `None` when no row in the month has a price.
    pub avg_unit_price: Option<f64>,
    pub value: f64,
    pub shipments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImporterTotal {
    pub declarant: String,
    pub shipments: usize,
    pub volume: f64,
    pub value: f64,
    pub products: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryTotal {
    pub country: String,
    pub shipments: usize,
    pub volume: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterSummary {
    pub chapter: u32,
    pub chapter_name: Option<String>,
    pub catalogue_codes: usize,
    /// Catalogue codes that appear at least once in the imports.
    pub imported_codes: usize,
}

fn require(store: &Store, table: &str) -> Result<()> {
    if store.table_exists(table)? {
        Ok(())
    } else {
        Err(Error::MissingTable(table.to_string()))
    }
}

fn query<T, P, F>(store: &Store, sql: &str, params: P, map: F) -> Result<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = store.conn().prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn category_summary(store: &Store) -> Result<Vec<CategorySummary>> {
    require(store, AGRICULTURAL_TABLE)?;
    query(
        store,
        &format!(
            "SELECT category, COUNT(*), COALESCE(SUM(quantity), 0), COALESCE(SUM(total_payable), 0),
                    COUNT(DISTINCT product), COUNT(DISTINCT declarant)
             FROM {AGRICULTURAL_TABLE}
             GROUP BY category
             ORDER BY 4 DESC"
        ),
        [],
        |row| {
            Ok(CategorySummary {
                category: row.get(0)?,
                shipments: row.get(1)?,
                volume: row.get(2)?,
                value: row.get(3)?,
                products: row.get(4)?,
                importers: row.get(5)?,
            })
        },
    )
}

pub fn top_products(store: &Store, by: RankBy, limit: usize) -> Result<Vec<ProductTotal>> {
    require(store, AGRICULTURAL_TABLE)?;
    let order = match by {
        RankBy::Volume => 3,
        RankBy::Value => 4,
    };
    query(
        store,
        &format!(
            "SELECT product, category, COALESCE(SUM(quantity), 0), COALESCE(SUM(total_payable), 0), COUNT(*)
             FROM {AGRICULTURAL_TABLE}
             GROUP BY product, category
             ORDER BY {order} DESC, product
             LIMIT ?1"
        ),
        params![limit as i64],
        |row| {
            Ok(ProductTotal {
                product: row.get(0)?,
                category: row.get(1)?,
                volume: row.get(2)?,
                value: row.get(3)?,
                shipments: row.get(4)?,
            })
        },
    )
}

/// Monthly totals, optionally for a single product.
pub fn monthly_trend(store: &Store, product: Option<&str>) -> Result<Vec<MonthlyPoint>> {
    require(store, AGRICULTURAL_TABLE)?;
    query(
        store,
        &format!(
            "SELECT strftime('%Y-%m', declaration_date) AS month,
                    COALESCE(SUM(quantity), 0),
                    SUM(unit_price * quantity) / SUM(CASE WHEN unit_price IS NOT NULL THEN quantity END),
                    COALESCE(SUM(total_payable), 0),
                    COUNT(*)
             FROM {AGRICULTURAL_TABLE}
             WHERE month IS NOT NULL AND (?1 IS NULL OR product = ?1)
             GROUP BY month
             ORDER BY month"
        ),
        params![product],
        |row| {
            Ok(MonthlyPoint {
                month: row.get(0)?,
                volume: row.get(1)?,
                avg_unit_price: row.get(2)?,
                value: row.get(3)?,
                shipments: row.get(4)?,
            })
        },
    )
}

pub fn top_importers(store: &Store, limit: usize) -> Result<Vec<ImporterTotal>> {
    require(store, AGRICULTURAL_TABLE)?;
    query(
        store,
        &format!(
            "SELECT declarant, COUNT(*), COALESCE(SUM(quantity), 0), COALESCE(SUM(total_payable), 0),
                    COUNT(DISTINCT product)
             FROM {AGRICULTURAL_TABLE}
             WHERE declarant IS NOT NULL
             GROUP BY declarant
             ORDER BY 4 DESC, declarant
             LIMIT ?1"
        ),
        params![limit as i64],
        |row| {
            Ok(ImporterTotal {
                declarant: row.get(0)?,
                shipments: row.get(1)?,
                volume: row.get(2)?,
                value: row.get(3)?,
                products: row.get(4)?,
            })
        },
    )
}

/// Origin countries by value, optionally for a single product.
pub fn top_countries(store: &Store, product: Option<&str>, limit: usize) -> Result<Vec<CountryTotal>> {
    require(store, AGRICULTURAL_TABLE)?;
    query(
        store,
        &format!(
            "SELECT country, COUNT(*), COALESCE(SUM(quantity), 0), COALESCE(SUM(total_payable), 0)
             FROM {AGRICULTURAL_TABLE}
             WHERE country IS NOT NULL AND (?1 IS NULL OR product = ?1)
             GROUP BY country
             ORDER BY 4 DESC, country
             LIMIT ?2"
        ),
        params![product, limit as i64],
        |row| {
            Ok(CountryTotal {
                country: row.get(0)?,
                shipments: row.get(1)?,
                volume: row.get(2)?,
                value: row.get(3)?,
            })
        },
    )
}

/// Per chapter: codes in the catalogue against codes actually imported.
pub fn chapter_summary(store: &Store) -> Result<Vec<ChapterSummary>> {
    require(store, CATALOGUE_TABLE)?;
    query(
        store,
        &format!(
            "SELECT c.chapter, MAX(c.chapter_name), COUNT(*),
                    SUM(CASE WHEN EXISTS (SELECT 1 FROM {IMPORTS_TABLE} i WHERE i.code = c.code)
                             THEN 1 ELSE 0 END)
             FROM {CATALOGUE_TABLE} c
             GROUP BY c.chapter
             ORDER BY c.chapter"
        ),
        [],
        |row| {
            Ok(ChapterSummary {
                chapter: row.get(0)?,
                chapter_name: row.get(1)?,
                catalogue_codes: row.get(2)?,
                imported_codes: row.get(3)?,
            })
        },
    )
}
