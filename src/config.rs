use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::{fs, path::Path, path::PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "tariff_catalogue.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_catalogue_pdf")]
    pub catalogue_pdf: PathBuf,
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/imports.db")
}

fn default_catalogue_pdf() -> PathBuf {
    PathBuf::from("data/docs/arancel_2025.pdf")
}

/// Extra label rules layered on top of the built-in rule table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizeConfig {
    /// Code (canonical or dotted) to display label. Wins over the built-in
    /// overrides.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    /// Built-in rule names to leave out.
    #[serde(default)]
    pub disabled_rules: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            catalogue_pdf: default_catalogue_pdf(),
            normalize: NormalizeConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!(path = %path.display(), "Loading config");
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path().join("none.toml")).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("data/imports.db"));
        assert!(cfg.normalize.overrides.is_empty());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_path = "/tmp/customs.db"

[normalize]
disabled_rules = ["las_demas_prefix"]

[normalize.overrides]
"0603.19.90.00.00" = "Astromelias"
"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/customs.db"));
        assert_eq!(cfg.catalogue_pdf, PathBuf::from("data/docs/arancel_2025.pdf"));
        assert_eq!(cfg.normalize.disabled_rules, vec!["las_demas_prefix"]);
        assert_eq!(
            cfg.normalize.overrides.get("0603.19.90.00.00").map(String::as_str),
            Some("Astromelias")
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_path = [").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(crate::error::Error::Config(_))
        ));
    }
}
