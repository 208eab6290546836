//! Icon catalog.
//!
//! Maps language identifiers to icon names and their available style
//! variants. The catalog is embedded at compile time from
//! `contrib/icons/catalog.toml`.

use serde::Deserialize;
use std::sync::OnceLock;

const CATALOG_TOML: &str = include_str!("../../../contrib/icons/catalog.toml");

static CATALOG: OnceLock<Vec<IconEntry>> = OnceLock::new();

#[derive(Debug, Deserialize)]
struct CatalogFile {
    icon: Vec<IconEntry>,
}

/// One icon family on the CDN.
#[derive(Debug, Clone, Deserialize)]
pub struct IconEntry {
    pub name: String,
    /// Other identifiers that resolve to this icon.
    #[serde(default)]
    pub altnames: Vec<String>,
    /// Available styles, most preferred first.
    pub variants: Vec<String>,
}

impl IconEntry {
    pub fn matches(&self, identifier: &str) -> bool {
        self.name == identifier || self.altnames.iter().any(|a| a == identifier)
    }

    /// The preferred variant if this icon has it, otherwise its first variant.
    pub fn pick_variant(&self, preferred: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| *v == preferred)
            .or_else(|| self.variants.first())
            .map(String::as_str)
    }
}

fn parse(src: &str) -> Vec<IconEntry> {
    match toml::from_str::<CatalogFile>(src) {
        Ok(file) => file.icon,
        Err(e) => {
            tracing::error!(error = %e, "bad icon catalog TOML");
            Vec::new()
        }
    }
}

/// All known icons.
pub fn catalog() -> &'static [IconEntry] {
    CATALOG.get_or_init(|| parse(CATALOG_TOML))
}

/// Look up an icon by language identifier (case-insensitive).
pub fn lookup(identifier: &str) -> Option<&'static IconEntry> {
    let id = identifier.trim().to_lowercase();
    catalog().iter().find(|entry| entry.matches(&id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_parses() {
        assert!(catalog().len() > 30);
        assert!(catalog().iter().all(|e| !e.variants.is_empty()));
    }

    #[test]
    fn test_lookup_by_name_and_altname() {
        assert_eq!(lookup("rust").map(|e| e.name.as_str()), Some("rust"));
        assert_eq!(lookup("C++").map(|e| e.name.as_str()), Some("cplusplus"));
        assert_eq!(lookup("Jupyter Notebook").map(|e| e.name.as_str()), Some("jupyter"));
        assert!(lookup("brainfuck").is_none());
    }

    #[test]
    fn test_pick_variant_falls_back_to_first() {
        let entry = lookup("go").unwrap();
        assert_eq!(entry.pick_variant("plain"), Some("plain"));
        assert_eq!(entry.pick_variant("line"), Some("original-wordmark"));
    }

    #[test]
    fn test_bad_toml_yields_empty_catalog() {
        assert!(parse("[[icon]]\nname = 3").is_empty());
    }
}
