//! Two-language string tables with English and key-name fallback.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Cookie holding the visitor's language preference.
pub const LANGUAGE_COOKIE: &str = "bloodlink_lang";

const EN_TABLE: &str = include_str!("../../locales/en.json");
const BN_TABLE: &str = include_str!("../../locales/bn.json");

type Table = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Bn,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Bn => "bn",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::En => Language::Bn,
            Language::Bn => Language::En,
        }
    }

    /// Set-Cookie value persisting this preference for a year.
    pub fn cookie(&self) -> String {
        format!(
            "{}={}; SameSite=Lax; Path=/; Max-Age=31536000",
            LANGUAGE_COOKIE,
            self.as_str()
        )
    }

    fn table(&self) -> &'static Table {
        static EN: OnceLock<Table> = OnceLock::new();
        static BN: OnceLock<Table> = OnceLock::new();
        match self {
            Language::En => EN.get_or_init(|| parse_table("en", EN_TABLE)),
            Language::Bn => BN.get_or_init(|| parse_table("bn", BN_TABLE)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "en" => Ok(Language::En),
            "bn" => Ok(Language::Bn),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

fn parse_table(name: &str, raw: &str) -> Table {
    match serde_json::from_str(raw) {
        Ok(table) => table,
        Err(e) => {
            tracing::error!("Failed to parse {} translation table: {}", name, e);
            Table::new()
        }
    }
}

/// Looks up strings for one language. Cheap to copy into templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translator {
    pub language: Language,
}

impl Translator {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Selected language first, then English, then the key itself.
    pub fn t(&self, key: &str) -> String {
        self.language
            .table()
            .get(key)
            .filter(|s| !s.is_empty())
            .or_else(|| Language::En.table().get(key).filter(|s| !s.is_empty()))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Like [`Translator::t`], substituting the first `{{name}}` occurrence
    /// of every replacement.
    pub fn t_with(&self, key: &str, replacements: &[(&str, &str)]) -> String {
        let mut translation = self.t(key);
        for (placeholder, value) in replacements {
            translation = translation.replacen(&format!("{{{{{}}}}}", placeholder), value, 1);
        }
        translation
    }
}
