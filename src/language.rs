use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Source languages the pipeline can analyze.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
        }
    }

    /// Interpreter looked up on `PATH` when none is configured.
    pub fn default_interpreter(&self) -> &'static str {
        match self {
            Language::Python => "python3",
        }
    }

    /// File name the sandbox writes the code to.
    pub fn script_name(&self) -> &'static str {
        match self {
            Language::Python => "main.py",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = crate::error::HalluscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            _ => Err(crate::error::HalluscanError::UnsupportedLanguage(s.to_string())),
        }
    }
}
