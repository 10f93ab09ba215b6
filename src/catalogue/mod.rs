// src/catalogue/mod.rs

mod chapters;
mod patterns;

pub use chapters::{ChapterNames, extract_chapter_names};
pub use patterns::{PATTERN_SET_VERSION, PatternYield};

use crate::code::CanonicalCode;
use serde::Serialize;

/// One row of the tariff catalogue as read from the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogueEntry {
    pub code: CanonicalCode,
    pub description: String,
    /// Categorical rate column, kept verbatim ("15", "II/10"). `None` when
    /// the line carried no tax columns.
    pub tariff_rate: Option<String>,
    pub itbms: f64,
    pub isc: f64,
    pub iccdp: f64,
}

/// Everything one pass over the document produced.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub entries: Vec<CatalogueEntry>,
    pub yields: Vec<PatternYield>,
    pub chapters: ChapterNames,
}

impl Extraction {
    pub fn chapter_name(&self, chapter: u32) -> Option<&str> {
        self.chapters.get(chapter)
    }
}

/// Run the code patterns and the chapter-heading scan over the full text.
pub fn extract_catalogue(text: &str) -> Extraction {
    let (entries, yields) = patterns::extract_entries(text);
    Extraction {
        entries,
        yields,
        chapters: extract_chapter_names(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rosas_sample() {
        let text = "Capítulo 6\nPlantas vivas y productos de la floricultura\n\
                    0603.11.00.00.00 - - Rosas 15 0 0 0\n";
        let extraction = extract_catalogue(text);

        assert_eq!(extraction.entries.len(), 1);
        let entry = &extraction.entries[0];
        assert_eq!(entry.code.value, 60311000000);
        assert_eq!(entry.code.chapter, 6);
        assert_eq!(entry.code.heading, 603);
        assert_eq!(entry.code.subheading, 60311);
        assert_eq!(entry.tariff_rate.as_deref(), Some("15"));
        assert_eq!(entry.description, "- - Rosas");
        assert_eq!(
            extraction.chapter_name(6),
            Some("Plantas vivas y productos de la floricultura")
        );
    }

    #[test]
    fn test_entry_serializes_with_code_prefixes() {
        let extraction = extract_catalogue("0603.11.00.00.00 - - Rosas 15 0 0 0\n");
        let json = serde_json::to_value(&extraction.entries[0]).unwrap();
        assert_eq!(json["code"]["value"], 60311000000_i64);
        assert_eq!(json["code"]["heading"], 603);
        assert_eq!(json["tariff_rate"], "15");
    }
}
