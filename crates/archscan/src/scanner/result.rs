//! Structured view of the scanner's JSON report.
//!
//! Findings are derived from the stored document on demand and never persisted
//! on their own.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::NormalizeError;

/// Top-level shape of a scanner report. Only `results` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub results: Vec<Finding>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check_id: String,
    pub path: String,
    #[serde(default)]
    pub start: Option<Position>,
    #[serde(default)]
    pub end: Option<Position>,
    #[serde(default)]
    pub extra: Extra,
}

impl Finding {
    /// `path:line` when the start position is known, otherwise just the path.
    pub fn location(&self) -> String {
        match &self.start {
            Some(start) => format!("{}:{}", self.path, start.line),
            None => self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u64,
    #[serde(default)]
    pub col: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    #[serde(default, deserialize_with = "nullable_string")]
    pub lines: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub message: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub asvs: Asvs,
    #[serde(default, deserialize_with = "nullable_string")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub confidence: String,
    #[serde(default)]
    pub cwe: ClassificationList,
    #[serde(default, deserialize_with = "nullable_string")]
    pub impact: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub likelihood: String,
    #[serde(default)]
    pub owasp: ClassificationList,
    #[serde(default)]
    pub references: ClassificationList,
    #[serde(default)]
    pub vulnerability_class: ClassificationList,
}

/// OWASP Application Security Verification Standard reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asvs {
    #[serde(default, deserialize_with = "nullable_string")]
    pub control_id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub control_url: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub section: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub version: String,
}

impl Asvs {
    pub fn is_empty(&self) -> bool {
        self.control_id.is_empty()
            && self.control_url.is_empty()
            && self.section.is_empty()
            && self.version.is_empty()
    }
}

/// A metadata field the scanner emits either as one string or as a list.
///
/// Always exposed as a list. `set` tells an absent field (`false`) apart from
/// one that was present but empty (`true`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationList {
    pub values: Vec<String>,
    pub set: bool,
}

impl ClassificationList {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.values.iter()
    }
}

impl<'de> Deserialize<'de> for ClassificationList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        // Only called when the key is present; absent keys take `Default` (set = false).
        let values = match Option::<OneOrMany>::deserialize(deserializer)? {
            Some(OneOrMany::One(value)) => vec![value],
            Some(OneOrMany::Many(values)) => values,
            None => Vec::new(),
        };

        Ok(Self { values, set: true })
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses a stored report into its findings, in document order.
pub fn normalize(raw: &str) -> Result<Vec<Finding>, NormalizeError> {
    let report: ScanReport = serde_json::from_str(raw)?;
    Ok(report.results)
}

/// Number of findings per severity, for summaries.
pub fn severity_counts(findings: &[Finding]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        let severity = finding
            .extra
            .severity
            .clone()
            .unwrap_or_else(|| "UNKNOWN".to_string());
        *counts.entry(severity).or_insert(0) += 1;
    }
    counts
}
