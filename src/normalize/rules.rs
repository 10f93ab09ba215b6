use super::{Label, Matcher, Rule};

const OVERRIDE: i32 = 400;
const SPECIES: i32 = 350;
const GENERIC: i32 = 300;
const CATCH_ALL: i32 = 250;
const PREFIX: i32 = 200;
const MARKERS: i32 = 100;

/// Chapter names are cut to this many characters in fallback labels.
const CHAPTER_NAME_WIDTH: usize = 30;

const FLOWER_OVERRIDES: &[(&str, i64, &str)] = &[
    ("override_rosas", 60311000000, "Rosas"),
    ("override_claveles", 60312000000, "Claveles"),
    ("override_orquideas", 60313000000, "Orquídeas"),
    ("override_crisantemos", 60314000000, "Crisantemos"),
    ("override_azucenas", 60315000000, "Azucenas (Lilium)"),
    ("override_gerberas", 60319600000, "Gerberas"),
    ("override_gladiolas", 60319920000, "Gladiolas"),
    ("override_anturios", 60319930000, "Anturios"),
    ("override_heliconias", 60319940000, "Heliconias"),
];

/// Species named in the description. Spelling variants seen in the
/// declarations map to the same label.
const SPECIES_KEYWORDS: &[(&str, &[&str], &str)] = &[
    ("species_rosas", &["rosas"], "Rosas"),
    ("species_claveles", &["claveles"], "Claveles"),
    ("species_orquideas", &["orquídeas", "orquideas"], "Orquídeas"),
    ("species_crisantemos", &["crisantemos"], "Crisantemos"),
    ("species_gerberas", &["gerberas", "serberas"], "Gerberas"),
    ("species_gladiolas", &["gladiolas"], "Gladiolas"),
    ("species_heliconias", &["heliconias"], "Heliconias"),
    ("species_anturios", &["anturios"], "Anturios"),
    ("species_astromerias", &["astromerias"], "Astromerias"),
    ("species_ginger", &["ginger"], "Ginger"),
    ("species_ave_del_paraiso", &["ave del paraíso", "ave del paraiso"], "Ave del Paraíso"),
    ("species_calas", &["calas"], "Calas"),
    ("species_gypsophila", &["sysofilia", "gypsophila"], "Gypsophila"),
    ("species_estatice", &["estaticias", "estatice"], "Estatice"),
    ("species_agapantos", &["agapantos"], "Agapantos"),
    ("species_azucenas", &["azucenas", "lilium"], "Azucenas (Lilium)"),
];

/// The built-in rule table.
pub fn default_rules() -> Vec<Rule> {
    let mut rules: Vec<Rule> = FLOWER_OVERRIDES
        .iter()
        .map(|(name, code, label)| {
            Rule::new(*name, OVERRIDE, Matcher::Code(*code), Label::Fixed(label.to_string()))
        })
        .collect();

    for (name, words, label) in SPECIES_KEYWORDS {
        rules.push(Rule::new(
            *name,
            SPECIES,
            Matcher::Keywords(words.iter().map(|w| w.to_string()).collect()),
            Label::Fixed(label.to_string()),
        ));
    }

    let headings = [
        ("generic_fresh_flowers", 603, 603, "Flores Frescas - Otras Variedades"),
        ("generic_live_plants", 601, 602, "Plantas Vivas - Otras"),
        ("generic_foliage", 604, 604, "Follaje y Ramas - Otros"),
    ];
    for (name, from, to, label) in headings {
        rules.push(Rule::new(
            name,
            GENERIC,
            Matcher::GenericInHeadings { from, to },
            Label::Fixed(label.to_string()),
        ));
    }

    for (name, chapter, prefix) in [
        ("generic_vegetables", 7, "Vegetales - "),
        ("generic_fruits", 8, "Frutas - "),
    ] {
        rules.push(Rule::new(
            name,
            GENERIC,
            Matcher::GenericInChapter(chapter),
            Label::ChapterName {
                prefix: prefix.to_string(),
                width: CHAPTER_NAME_WIDTH,
            },
        ));
    }

    for (name, chapter, label) in [
        ("generic_coffee_tea_spices", 9, "Café, Té, Especias - Otros"),
        ("generic_cereals", 10, "Cereales - Otros"),
        ("generic_seeds", 12, "Semillas y Plantas - Otros"),
    ] {
        rules.push(Rule::new(
            name,
            GENERIC,
            Matcher::GenericInChapter(chapter),
            Label::Fixed(label.to_string()),
        ));
    }

    // Vegetable products (chapters 6 to 14) left over by the rules above.
    rules.push(Rule::new(
        "generic_agricultural",
        CATCH_ALL,
        Matcher::GenericInChapters { from: 6, to: 14 },
        Label::Fixed("Productos Agrícolas - Otros".into()),
    ));

    rules.push(Rule::new(
        "los_demas_prefix",
        PREFIX,
        Matcher::Prefix("Los demás".into()),
        Label::ReplacePrefix { to: "Otros".into() },
    ));
    rules.push(Rule::new(
        "las_demas_prefix",
        PREFIX,
        Matcher::Prefix("Las demás".into()),
        Label::ReplacePrefix { to: "Otras".into() },
    ));

    rules.push(Rule::new(
        "hierarchy_markers",
        MARKERS,
        Matcher::HierarchyMarkers,
        Label::StripMarkers,
    ));

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_names_are_unique() {
        let rules = default_rules();
        let names: HashSet<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), rules.len());
    }

    #[test]
    fn test_overrides_rank_first() {
        let engine = super::super::RuleEngine::default();
        let first = &engine.rules()[0];
        assert_eq!(first.priority, OVERRIDE);
        assert_eq!(engine.rules().last().map(|r| r.name.as_str()), Some("hierarchy_markers"));
    }
}
