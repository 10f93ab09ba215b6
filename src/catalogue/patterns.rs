use super::CatalogueEntry;
use crate::code::CanonicalCode;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Bumped whenever a pattern below changes, so a re-extraction of an
/// unchanged document is not mistaken for a no-op.
pub const PATTERN_SET_VERSION: u32 = 3;

/// How many entries a single pattern contributed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PatternYield {
    pub pattern: &'static str,
    pub matches: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

#[derive(Clone, Copy)]
enum Shape {
    /// code, description, rate, itbms, isc, iccdp
    WithTaxes,
    /// code, description
    DescriptionOnly,
}

struct CodePattern {
    name: &'static str,
    shape: Shape,
    regex: fn() -> &'static Regex,
}

// Most specific first. A code taken by an earlier pattern is never
// overwritten by a later one.
const PATTERNS: &[CodePattern] = &[
    CodePattern {
        name: "full",
        shape: Shape::WithTaxes,
        regex: full_re,
    },
    CodePattern {
        name: "short_heading",
        shape: Shape::WithTaxes,
        regex: short_heading_re,
    },
    CodePattern {
        name: "description_only",
        shape: Shape::DescriptionOnly,
        regex: description_only_re,
    },
];

const RATE: &str = r"(\d+|[IVX]+/\d+)";
const TAX: &str = r"(\d+(?:\.\d+)?)";

fn full_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(\d{{4}}\.\d{{2}}\.\d{{2}}\.\d{{2}}\.\d{{2}})\s+(.+?)\s+{RATE}\s+{TAX}\s+{TAX}\s+{TAX}"
        ))
        .expect("full code regex")
    })
}

fn short_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\b(\d{{2}}\.\d{{2}}\.\d{{2}}\.\d{{2}}\.\d{{2}})\s+(.+?)\s+{RATE}\s+{TAX}\s+{TAX}\s+{TAX}"
        ))
        .expect("short heading regex")
    })
}

fn description_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4}\.\d{2}\.\d{2}\.\d{2}\.\d{2})\s+([A-Za-zÀ-ÿ \t\-,.()]+)")
            .expect("description only regex")
    })
}

fn next_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}\.").expect("next code regex"))
}

/// A description-only line must end at a newline, the end of the text, or
/// where the next code starts. Anything else (a stray digit, a `%`) means
/// the line belongs to a layout we do not understand.
fn ends_cleanly(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with('\n') || next_code_re().is_match(rest)
}

fn parse_tax(raw: &str) -> f64 {
    raw.parse().unwrap_or(0.0)
}

fn entry_from(shape: Shape, caps: &Captures<'_>, code: CanonicalCode) -> CatalogueEntry {
    match shape {
        Shape::WithTaxes => CatalogueEntry {
            code,
            description: caps[2].trim().to_string(),
            tariff_rate: Some(caps[3].to_string()),
            itbms: parse_tax(&caps[4]),
            isc: parse_tax(&caps[5]),
            iccdp: parse_tax(&caps[6]),
        },
        Shape::DescriptionOnly => CatalogueEntry {
            code,
            description: caps[2].trim().to_string(),
            tariff_rate: None,
            itbms: 0.0,
            isc: 0.0,
            iccdp: 0.0,
        },
    }
}

/// Apply every pattern in priority order, first match per code wins.
pub fn extract_entries(text: &str) -> (Vec<CatalogueEntry>, Vec<PatternYield>) {
    let mut entries = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();
    let mut yields = Vec::with_capacity(PATTERNS.len());

    for pattern in PATTERNS {
        let span = tracing::info_span!("pattern", name = pattern.name);
        let _guard = span.enter();

        let mut stats = PatternYield {
            pattern: pattern.name,
            matches: 0,
            accepted: 0,
            duplicates: 0,
            invalid: 0,
        };

        for caps in (pattern.regex)().captures_iter(text) {
            if let Shape::DescriptionOnly = pattern.shape {
                let end = caps.get(0).map_or(text.len(), |m| m.end());
                if !ends_cleanly(&text[end..]) || caps[2].trim().is_empty() {
                    continue;
                }
            }
            stats.matches += 1;

            let Some(code) = CanonicalCode::parse(&caps[1]) else {
                debug!(raw = &caps[1], "Dropping code that failed normalization");
                stats.invalid += 1;
                continue;
            };
            if !seen.insert(code.value) {
                stats.duplicates += 1;
                continue;
            }

            entries.push(entry_from(pattern.shape, &caps, code));
            stats.accepted += 1;
        }

        if stats.matches == 0 {
            warn!("Pattern matched nothing");
        }
        info!(
            matches = stats.matches,
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            "Pattern pass complete"
        );
        yields.push(stats);
    }

    (entries, yields)
}
