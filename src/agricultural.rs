//! The agricultural subset of the imports, joined with catalogue labels.

use crate::code::{CHAPTER_DIVISOR, chapter_of};
use crate::error::Result;
use crate::store::{AGRICULTURAL_TABLE, CATALOGUE_TABLE, IMPORTS_TABLE, Store, TableRebuild};
use serde::Serialize;
use tracing::info;

/// Coarse category of an agricultural import, fixed by its chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    FlowersAndPlants,
    Vegetables,
    FruitsAndNuts,
    CoffeeTeaSpices,
    Cereals,
    Seeds,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::FlowersAndPlants,
        Category::Vegetables,
        Category::FruitsAndNuts,
        Category::CoffeeTeaSpices,
        Category::Cereals,
        Category::Seeds,
    ];

    pub fn from_chapter(chapter: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.chapter() == chapter)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::from_chapter(chapter_of(code))
    }

    pub fn chapter(self) -> u32 {
        match self {
            Category::FlowersAndPlants => 6,
            Category::Vegetables => 7,
            Category::FruitsAndNuts => 8,
            Category::CoffeeTeaSpices => 9,
            Category::Cereals => 10,
            Category::Seeds => 12,
        }
    }

    /// Tag stored in the `category` column.
    pub fn tag(self) -> &'static str {
        match self {
            Category::FlowersAndPlants => "Flores y Plantas",
            Category::Vegetables => "Vegetales",
            Category::FruitsAndNuts => "Frutas y Nueces",
            Category::CoffeeTeaSpices => "Café, Té, Especias",
            Category::Cereals => "Cereales",
            Category::Seeds => "Semillas y Plantas Agrícolas",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewReport {
    pub rows: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    pub labelled_rows: usize,
}

fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn category_case() -> String {
    let arms: String = Category::ALL
        .iter()
        .map(|c| {
            format!(
                " WHEN {} THEN {}",
                c.chapter(),
                sql_literal(c.tag())
            )
        })
        .collect();
    format!("CASE (i.code / {CHAPTER_DIVISOR}){arms} END")
}

fn chapter_allow_list() -> String {
    Category::ALL
        .iter()
        .map(|c| c.chapter().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rebuild `agricultural_imports` from scratch.
///
/// Every import in an allow-listed chapter lands in the view, matched or
/// not. Without a catalogue the enrichment columns are all NULL.
pub fn build_view(store: &Store) -> Result<ViewReport> {
    let _span = tracing::info_span!("build_view").entered();

    let catalogue = if store.has_catalogue()? {
        CATALOGUE_TABLE.to_string()
    } else {
        info!("No catalogue yet, enrichment columns will be empty");
        "(SELECT NULL AS code, NULL AS description, NULL AS chapter_name, \
          NULL AS tariff_rate, NULL AS display_label WHERE 0)"
            .to_string()
    };
    let allow_list = chapter_allow_list();

    let expected: usize = store.conn().query_row(
        &format!(
            "SELECT COUNT(*) FROM {IMPORTS_TABLE}
             WHERE (code / {CHAPTER_DIVISOR}) IN ({allow_list})"
        ),
        [],
        |row| row.get(0),
    )?;

    let category = category_case();
    let rows = TableRebuild::new(store.conn(), AGRICULTURAL_TABLE)
        .index("idx_agri_date", "declaration_date")
        .index("idx_agri_declarant", "declarant")
        .index("idx_agri_category", "category")
        .index("idx_agri_product", "product")
        .expect_rows(expected)
        .run(|conn, staging| {
            conn.execute(
                &format!(
                    "CREATE TABLE {staging} AS
                     SELECT i.*,
                            c.description AS official_description,
                            c.chapter_name AS chapter_name,
                            c.tariff_rate AS official_tariff_rate,
                            c.display_label AS display_label,
                            {category} AS category,
                            COALESCE(c.display_label, TRIM(i.description)) AS product
                     FROM {IMPORTS_TABLE} i
                     LEFT JOIN {catalogue} c ON i.code = c.code
                     WHERE (i.code / {CHAPTER_DIVISOR}) IN ({allow_list})"
                ),
                [],
            )?;
            Ok(())
        })?;

    let (matched_rows, labelled_rows): (usize, usize) = store.conn().query_row(
        &format!(
            "SELECT COUNT(official_description), COUNT(display_label) FROM {AGRICULTURAL_TABLE}"
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let report = ViewReport {
        rows,
        matched_rows,
        unmatched_rows: rows - matched_rows,
        labelled_rows,
    };
    info!(
        rows = report.rows,
        matched = report.matched_rows,
        unmatched = report.unmatched_rows,
        labelled = report.labelled_rows,
        "Agricultural view built"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::extract_catalogue;
    use crate::normalize::RuleEngine;
    use crate::store::ImportRecord;

    fn import(code: Option<i64>, description: &str) -> ImportRecord {
        ImportRecord {
            declaration_date: Some("2024-05-02".into()),
            declarant: Some("Agro Import".into()),
            country: Some("ECUADOR".into()),
            code,
            description: Some(description.into()),
            quantity: Some(10.0),
            unit: Some("KG".into()),
            total_payable: Some(100.0),
            source_file: "mayo.xlsx".into(),
        }
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .append_imports(&[
                import(Some(60311000000), "ROSAS ROJAS"),
                import(Some(60311000000), "ROSAS BLANCAS"),
                import(Some(70190000000), " PAPAS "),
                import(Some(120999000000), "SEMILLAS"),
                import(Some(847130000000), "LAPTOP"),
                import(None, "SIN CODIGO"),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_category_is_function_of_chapter() {
        assert_eq!(Category::from_code(60311000000), Some(Category::FlowersAndPlants));
        assert_eq!(Category::from_code(120999000000), Some(Category::Seeds));
        assert_eq!(Category::from_chapter(11), None);
        assert_eq!(Category::from_chapter(9).map(Category::tag), Some("Café, Té, Especias"));
    }

    #[test]
    fn test_view_keeps_unmatched_rows() {
        let store = seeded_store();
        store
            .replace_catalogue(&extract_catalogue("0603.11.00.00.00 - - Rosas 15 0 0 0\n"))
            .unwrap();
        RuleEngine::default().apply(&store).unwrap();

        let report = build_view(&store).unwrap();
        assert_eq!(report.rows, 4);
        assert_eq!(report.matched_rows, 2);
        assert_eq!(report.unmatched_rows, 2);

        let products: Vec<(String, String)> = {
            let mut stmt = store
                .conn()
                .prepare("SELECT category, product FROM agricultural_imports ORDER BY code, rowid")
                .unwrap();
            stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
                .unwrap()
                .collect::<rusqlite::Result<_>>()
                .unwrap()
        };
        assert_eq!(products[0], ("Flores y Plantas".into(), "Rosas".into()));
        assert_eq!(products[2], ("Vegetales".into(), "PAPAS".into()));
        assert_eq!(products[3].0, "Semillas y Plantas Agrícolas");
    }

    #[test]
    fn test_view_without_catalogue() {
        let store = seeded_store();
        let report = build_view(&store).unwrap();
        assert_eq!(report.rows, 4);
        assert_eq!(report.matched_rows, 0);
        assert!(store.columns(AGRICULTURAL_TABLE).unwrap().contains(&"display_label".to_string()));
    }

    #[test]
    fn test_rebuild_replaces_previous_view() {
        let store = seeded_store();
        build_view(&store).unwrap();
        store.append_imports(&[import(Some(80310000000), "BANANOS")]).unwrap();
        assert_eq!(build_view(&store).unwrap().rows, 5);
    }
}
