use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Chapter number to chapter name, as declared by the document headings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterNames {
    names: BTreeMap<u32, String>,
    /// Chapters declared more than once. The last declaration wins; these
    /// are only reported.
    pub redeclared: Vec<u32>,
}

impl ChapterNames {
    pub fn get(&self, chapter: u32) -> Option<&str> {
        self.names.get(&chapter).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn chapter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)cap[íi]tulo\s+(\d+)\s*\n\s*(.+)").expect("chapter heading regex")
    })
}

pub fn extract_chapter_names(text: &str) -> ChapterNames {
    let mut chapters = ChapterNames::default();

    for caps in chapter_re().captures_iter(text) {
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        let name = caps[2].trim();
        if name.is_empty() {
            continue;
        }
        if let Some(previous) = chapters.names.insert(number, name.to_string()) {
            if previous != name && !chapters.redeclared.contains(&number) {
                chapters.redeclared.push(number);
            }
        }
    }

    if !chapters.redeclared.is_empty() {
        warn!(
            chapters = ?chapters.redeclared,
            "Chapter heading declared more than once, keeping the last one"
        );
    }
    info!(chapters = chapters.len(), "Chapter names extracted");
    chapters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_declaration_wins() {
        let text = "Capítulo 7\nHortalizas, plantas, raíces y tubérculos alimenticios\n\
                    texto\n\
                    CAPÍTULO 7\nHortalizas (repetido)\n\
                    Capitulo 8\n  Frutas y frutos comestibles\n";
        let chapters = extract_chapter_names(text);

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters.get(7), Some("Hortalizas (repetido)"));
        assert_eq!(chapters.get(8), Some("Frutas y frutos comestibles"));
        assert_eq!(chapters.redeclared, vec![7]);
    }

    #[test]
    fn test_identical_repeat_is_not_flagged() {
        let text = "Capítulo 9\nCafé, té, yerba mate y especias\n\
                    Capítulo 9\nCafé, té, yerba mate y especias\n";
        let chapters = extract_chapter_names(text);
        assert!(chapters.redeclared.is_empty());
        assert_eq!(chapters.get(9), Some("Café, té, yerba mate y especias"));
    }

    #[test]
    fn test_marker_without_name_line() {
        assert!(extract_chapter_names("Capítulo 10").is_empty());
    }
}
