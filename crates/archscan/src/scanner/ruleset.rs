use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

/// Registry rule packs a scan can be run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ruleset {
    Default,
    OwaspTopTen,
    #[serde(rename = "cwe-top-25")]
    CweTop25,
    Java,
    Javascript,
    Nodejs,
    Php,
    Python,
    React,
    Typescript,
}

impl Ruleset {
    pub const ALL: [Ruleset; 10] = [
        Ruleset::Default,
        Ruleset::OwaspTopTen,
        Ruleset::CweTop25,
        Ruleset::Java,
        Ruleset::Javascript,
        Ruleset::Nodejs,
        Ruleset::Php,
        Ruleset::Python,
        Ruleset::React,
        Ruleset::Typescript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ruleset::Default => "default",
            Ruleset::OwaspTopTen => "owasp-top-ten",
            Ruleset::CweTop25 => "cwe-top-25",
            Ruleset::Java => "java",
            Ruleset::Javascript => "javascript",
            Ruleset::Nodejs => "nodejs",
            Ruleset::Php => "php",
            Ruleset::Python => "python",
            Ruleset::React => "react",
            Ruleset::Typescript => "typescript",
        }
    }

    /// Value passed to the scanner's `--config` option.
    pub fn config_arg(&self) -> String {
        format!("p/{}", self.as_str())
    }

    /// Comma-separated list of every registered key, for error messages and help text.
    pub fn known_keys() -> String {
        Self::ALL
            .iter()
            .map(Ruleset::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ruleset {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == key)
            .ok_or_else(|| SubmitError::UnknownRuleset {
                given: key.to_string(),
                known: Self::known_keys(),
            })
    }
}
