//! Display labels for catalogue entries.
//!
//! Labels come from an ordered rule table, first match wins. The label is
//! always recomputed from the official description, never from a previous
//! label, so a run over unchanged input is a no-op and an edited table
//! relabels every affected row.

mod rules;

pub use rules::default_rules;

use crate::code::CanonicalCode;
use crate::config::NormalizeConfig;
use crate::error::Result;
use crate::store::{CatalogueRow, Store};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Priority given to overrides coming from the config file.
const CONFIG_OVERRIDE_PRIORITY: i32 = 500;

/// Name reported for rows that fell through every rule.
pub const DEFAULT_RULE: &str = "trim";

/// The inputs a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct LabelInput<'a> {
    pub code: i64,
    pub chapter: u32,
    pub heading: u32,
    pub description: &'a str,
    pub chapter_name: Option<&'a str>,
}

impl<'a> From<&'a CatalogueRow> for LabelInput<'a> {
    fn from(row: &'a CatalogueRow) -> Self {
        Self {
            code: row.code,
            chapter: row.chapter,
            heading: row.heading,
            description: &row.description,
            chapter_name: row.chapter_name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Exact canonical code.
    Code(i64),
    /// Generic wording inside a heading range (inclusive).
    GenericInHeadings { from: u32, to: u32 },
    /// Generic wording anywhere in a chapter.
    GenericInChapter(u32),
    /// Generic wording anywhere in a chapter range (inclusive).
    GenericInChapters { from: u32, to: u32 },
    /// Description mentions any of these words or phrases, ignoring case.
    Keywords(Vec<String>),
    /// Description starts with this phrase, ignoring case.
    Prefix(String),
    /// Description starts with one to four "- " hierarchy markers.
    HierarchyMarkers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Fixed(String),
    /// `prefix` followed by the first `width` characters of the chapter name,
    /// or by "Otros" when the chapter has no name.
    ChapterName { prefix: String, width: usize },
    /// Swap the matched prefix for `to`, keep the rest.
    ReplacePrefix { to: String },
    StripMarkers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub priority: i32,
    pub matcher: Matcher,
    pub label: Label,
}

impl Rule {
    pub fn new(name: impl Into<String>, priority: i32, matcher: Matcher, label: Label) -> Self {
        Self {
            name: name.into(),
            priority,
            matcher,
            label,
        }
    }

    /// The label this rule assigns, or `None` when it does not apply.
    pub fn apply(&self, input: &LabelInput<'_>) -> Option<String> {
        let description = input.description.trim();
        let rest = match &self.matcher {
            Matcher::Code(code) => (input.code == *code).then_some(description)?,
            Matcher::GenericInHeadings { from, to } => {
                ((*from..=*to).contains(&input.heading) && is_generic(description))
                    .then_some(description)?
            }
            Matcher::GenericInChapter(chapter) => {
                (input.chapter == *chapter && is_generic(description)).then_some(description)?
            }
            Matcher::GenericInChapters { from, to } => {
                ((*from..=*to).contains(&input.chapter) && is_generic(description))
                    .then_some(description)?
            }
            Matcher::Keywords(words) => words
                .iter()
                .any(|w| contains_word(description, w))
                .then_some(description)?,
            Matcher::Prefix(prefix) => strip_prefix_ignore_case(description, prefix)?,
            Matcher::HierarchyMarkers => strip_markers(description)?,
        };

        Some(match &self.label {
            Label::Fixed(label) => label.clone(),
            Label::ChapterName { prefix, width } => match input.chapter_name {
                Some(name) => {
                    let head: String = name.chars().take(*width).collect();
                    format!("{prefix}{}", head.trim_end())
                }
                None => format!("{prefix}Otros"),
            },
            Label::ReplacePrefix { to } => format!("{to}{rest}"),
            Label::StripMarkers => rest.trim().to_string(),
        })
    }
}

/// "Los demás", "otros", "otras": the catch-all wording of the catalogue.
pub fn is_generic(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["demás", "otros", "otras"].iter().any(|w| lower.contains(w))
}

/// Case-insensitive search for `needle` as a whole word or phrase, so
/// "calas" does not fire inside "escalas".
fn contains_word(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(&needle).any(|(start, m)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let end = chars.next().map_or(text.len(), |(idx, _)| idx);
    Some(&text[end..])
}

/// Remove up to four leading "- " markers. `None` when there are none.
fn strip_markers(text: &str) -> Option<&str> {
    let mut rest = text;
    let mut depth = 0;
    while depth < 4 {
        match rest.strip_prefix("- ") {
            Some(r) => {
                rest = r;
                depth += 1;
            }
            None => break,
        }
    }
    (depth > 0).then_some(rest)
}

/// Ordered rule table plus the generic evaluator.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RuleEngine {
    /// Highest priority first; equal priorities keep their listed order.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Built-in table adjusted by the `[normalize]` config section.
    pub fn from_config(cfg: &NormalizeConfig) -> Self {
        let mut rules: Vec<Rule> = default_rules()
            .into_iter()
            .filter(|r| !cfg.disabled_rules.contains(&r.name))
            .collect();

        for (raw, label) in &cfg.overrides {
            let Some(code) = CanonicalCode::parse(raw) else {
                warn!(code = %raw, "Ignoring label override with an invalid code");
                continue;
            };
            rules.push(Rule::new(
                format!("config_override:{}", code.value),
                CONFIG_OVERRIDE_PRIORITY,
                Matcher::Code(code.value),
                Label::Fixed(label.clone()),
            ));
        }
        Self::new(rules)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Label plus the name of the rule that produced it.
    pub fn label(&self, input: &LabelInput<'_>) -> (String, &str) {
        for rule in &self.rules {
            if let Some(label) = rule.apply(input) {
                return (label, &rule.name);
            }
        }
        (input.description.trim().to_string(), DEFAULT_RULE)
    }

    /// Recompute the display label of every catalogue row.
    pub fn apply(&self, store: &Store) -> Result<NormalizeReport> {
        let rows = store.catalogue_rows()?;
        let mut report = NormalizeReport {
            rows: rows.len(),
            ..Default::default()
        };

        let mut labels = Vec::with_capacity(rows.len());
        for row in &rows {
            let (label, rule) = self.label(&LabelInput::from(row));
            *report.per_rule.entry(rule.to_string()).or_default() += 1;
            if row.display_label.as_deref() != Some(label.as_str()) {
                report.changed += 1;
            }
            labels.push((row.code, label));
        }

        store.set_display_labels(&labels)?;
        report.distinct_descriptions = count_distinct(rows.iter().map(|r| r.description.as_str()));
        report.distinct_labels = count_distinct(labels.iter().map(|(_, l)| l.as_str()));

        info!(
            rows = report.rows,
            changed = report.changed,
            distinct_descriptions = report.distinct_descriptions,
            distinct_labels = report.distinct_labels,
            "Display labels recomputed"
        );
        Ok(report)
    }
}

fn count_distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.collect::<std::collections::HashSet<_>>().len()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub rows: usize,
    /// Rows whose label differs from what the previous run stored.
    pub changed: usize,
    pub per_rule: BTreeMap<String, usize>,
    pub distinct_descriptions: usize,
    pub distinct_labels: usize,
}
