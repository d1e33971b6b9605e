//! Item-name languages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AisleError;

/// Language an item name was typed in, passed through to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    He,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::He => "he",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = AisleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "he" => Ok(Language::He),
            "en" => Ok(Language::En),
            _ => Err(AisleError::InvalidLanguage(s.to_string())),
        }
    }
}
