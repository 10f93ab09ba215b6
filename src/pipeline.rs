//! Stage functions. Each one takes the store handle, does its work, logs a
//! report and returns it.

use crate::agricultural::{self, ViewReport};
use crate::catalogue::{PATTERN_SET_VERSION, PatternYield, extract_catalogue};
use crate::config::Config;
use crate::document::{self, DocumentText};
use crate::error::Result;
use crate::normalize::{NormalizeReport, RuleEngine};
use crate::reconcile::{self, Coverage, UnmatchedCode};
use crate::store::{ExtractionRun, Store, UnitPriceStats};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractReport {
    /// Same document and pattern set as the last run; nothing was rewritten.
    pub skipped: bool,
    pub source_sha256: String,
    pub entries: usize,
    pub chapters: usize,
    pub redeclared_chapters: Vec<u32>,
    pub yields: Vec<PatternYield>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub coverage: Coverage,
    pub match_percentage: f64,
    pub row_match_percentage: f64,
    pub unmatched: Vec<UnmatchedCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub extract: ExtractReport,
    pub normalize: NormalizeReport,
    pub unit_price: UnitPriceStats,
    pub view: ViewReport,
    pub reconcile: ReconcileReport,
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Extract the catalogue from the PDF at `pdf`. Without `force` this is a
/// no-op when the document and pattern set match the last run.
pub fn extract(store: &Store, pdf: &Path, force: bool) -> Result<ExtractReport> {
    let _span = tracing::info_span!("extract", pdf = %pdf.display()).entered();
    let bytes = std::fs::read(pdf)?;
    let sha = fingerprint(&bytes);

    if !force {
        if let Some(last) = current_run(store, &sha)? {
            info!(sha256 = %sha, "Catalogue already extracted from this document, skipping");
            return Ok(ExtractReport {
                skipped: true,
                source_sha256: sha,
                entries: last.entries,
                chapters: last.chapters,
                ..Default::default()
            });
        }
    }

    let text = document::extract_text_from_pdf(&bytes)?;
    info!(pages = text.pages.len(), "Document text read");
    extract_from_text(store, &text, sha)
}

/// The last run, if it was over this document with the current pattern set
/// and its catalogue is still there.
fn current_run(store: &Store, sha: &str) -> Result<Option<ExtractionRun>> {
    let Some(last) = store.last_extraction()? else {
        return Ok(None);
    };
    let current = last.source_sha256 == sha
        && last.pattern_version == PATTERN_SET_VERSION
        && store.has_catalogue()?;
    Ok(current.then_some(last))
}

/// Extract from already-read text and replace the catalogue.
pub fn extract_from_text(store: &Store, text: &DocumentText, sha: String) -> Result<ExtractReport> {
    let extraction = extract_catalogue(&text.full_text());
    for chapter in &extraction.chapters.redeclared {
        warn!(chapter, "Chapter declared more than once with different names, last one kept");
    }

    let entries = store.replace_catalogue(&extraction)?;
    store.record_extraction(&ExtractionRun {
        source_sha256: sha.clone(),
        pattern_version: PATTERN_SET_VERSION,
        extracted_at: now_rfc3339(),
        entries,
        chapters: extraction.chapters.len(),
    })?;

    info!(
        entries,
        chapters = extraction.chapters.len(),
        "Catalogue extracted"
    );
    Ok(ExtractReport {
        skipped: false,
        source_sha256: sha,
        entries,
        chapters: extraction.chapters.len(),
        redeclared_chapters: extraction.chapters.redeclared.clone(),
        yields: extraction.yields,
    })
}

pub fn normalize(store: &Store, cfg: &Config) -> Result<NormalizeReport> {
    let _span = tracing::info_span!("normalize").entered();
    RuleEngine::from_config(&cfg.normalize).apply(store)
}

pub fn unit_price(store: &Store) -> Result<UnitPriceStats> {
    let _span = tracing::info_span!("unit_price").entered();
    store.compute_unit_price()
}

pub fn build_view(store: &Store) -> Result<ViewReport> {
    agricultural::build_view(store)
}

pub fn reconcile(store: &Store, unmatched_limit: Option<usize>) -> Result<ReconcileReport> {
    let _span = tracing::info_span!("reconcile").entered();
    let coverage = reconcile::coverage(store)?;
    let unmatched = match unmatched_limit {
        Some(0) => Vec::new(),
        limit => reconcile::unmatched_codes(store, limit)?,
    };
    for u in unmatched.iter().take(10) {
        info!(code = u.code, rows = u.rows, nearest = ?u.nearest, "Unmatched code");
    }
    Ok(ReconcileReport {
        match_percentage: coverage.match_percentage(),
        row_match_percentage: coverage.row_match_percentage(),
        coverage,
        unmatched,
    })
}

/// Every stage in order: extract, normalize, unit price, view, reconcile.
pub fn run_all(store: &Store, cfg: &Config, pdf: &Path, force: bool) -> Result<RunReport> {
    let extract = extract(store, pdf, force)?;
    let normalize = normalize(store, cfg)?;
    let unit_price = unit_price(store)?;
    let view = build_view(store)?;
    let reconcile = reconcile(store, Some(20))?;
    info!("Pipeline finished");
    Ok(RunReport {
        extract,
        normalize,
        unit_price,
        view,
        reconcile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AGRICULTURAL_TABLE, ImportRecord};

    const TEXT: &str = "Capítulo 6\nPlantas vivas y productos de la floricultura\n\
                        0603.11.00.00.00 - - Rosas 15 0 0 0\n\
                        0603.19.99.00.00 - - - Las demás 15 0 0 0\n\
                        Capítulo 6\nPlantas vivas\n";

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let sha = fingerprint(b"abc");
        assert_eq!(sha.len(), 64);
        assert!(sha.starts_with("ba7816bf"));
    }

    #[test]
    fn test_extract_from_text_records_run() {
        let store = Store::open_in_memory().unwrap();
        let report = extract_from_text(&store, &DocumentText::from_text(TEXT), "feed".into()).unwrap();
        assert!(!report.skipped);
        assert_eq!(report.entries, 2);
        assert_eq!(report.redeclared_chapters, vec![6]);

        let run = store.last_extraction().unwrap().unwrap();
        assert_eq!(run.source_sha256, "feed");
        assert_eq!(run.pattern_version, PATTERN_SET_VERSION);
        assert!(run.extracted_at.contains('T'));
    }

    #[test]
    fn test_extract_skips_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("arancel.pdf");
        std::fs::write(&pdf, b"not really a pdf").unwrap();

        let store = Store::open_in_memory().unwrap();
        let sha = fingerprint(b"not really a pdf");
        extract_from_text(&store, &DocumentText::from_text(TEXT), sha).unwrap();

        let report = extract(&store, &pdf, false).unwrap();
        assert!(report.skipped);
        assert_eq!(report.entries, 2);
        // Same meaning as a real run: every declared chapter.
        assert_eq!(report.chapters, 1);

        // Forcing re-reads the (invalid) document.
        assert!(extract(&store, &pdf, true).is_err());
        assert_eq!(store.catalogue_stats().unwrap().total_codes, 2);
    }

    #[test]
    fn test_skip_reports_chapters_of_last_run() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("arancel.pdf");
        std::fs::write(&pdf, b"pdf bytes").unwrap();

        // Chapter 7 is declared but has no codes, so the catalogue only
        // knows chapter 6.
        let text = format!("{TEXT}Capítulo 7\nHortalizas\n");
        let store = Store::open_in_memory().unwrap();
        let first = extract_from_text(&store, &DocumentText::from_text(text), fingerprint(b"pdf bytes")).unwrap();
        assert_eq!(first.chapters, 2);
        assert_eq!(store.catalogue_stats().unwrap().named_chapters, 1);

        let skipped = extract(&store, &pdf, false).unwrap();
        assert!(skipped.skipped);
        assert_eq!(skipped.chapters, first.chapters);
        assert_eq!(skipped.entries, first.entries);
    }

    #[test]
    fn test_missing_pdf_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let result = extract(&store, &dir.path().join("absent.pdf"), false);
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }

    #[test]
    fn test_stages_after_extract() {
        let store = Store::open_in_memory().unwrap();
        extract_from_text(&store, &DocumentText::from_text(TEXT), "feed".into()).unwrap();
        store
            .append_imports(&[
                ImportRecord {
                    code: Some(60311000000),
                    description: Some("ROSAS".into()),
                    quantity: Some(0.0),
                    total_payable: Some(10.0),
                    source_file: "a.xlsx".into(),
                    ..Default::default()
                },
                ImportRecord {
                    code: Some(60399000000),
                    description: Some("OTRAS".into()),
                    source_file: "a.xlsx".into(),
                    ..Default::default()
                },
            ])
            .unwrap();

        let norm = normalize(&store, &Config::default()).unwrap();
        assert_eq!(norm.rows, 2);
        assert_eq!(unit_price(&store).unwrap().with_price, 0);
        assert_eq!(build_view(&store).unwrap().rows, 2);
        assert_eq!(store.count_rows(AGRICULTURAL_TABLE).unwrap(), 2);

        let rec = reconcile(&store, None).unwrap();
        assert_eq!(rec.match_percentage, 50.0);
        assert_eq!(rec.unmatched.len(), 1);
        assert_eq!(rec.unmatched[0].code, 60399000000);
        assert!(reconcile(&store, Some(0)).unwrap().unmatched.is_empty());
    }
}
