use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        })
    }
}

/// Outcome of checking one rule. `Error` is a first-class status, not an absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "Compliant")]
    Compliant,
    #[serde(rename = "Non-Compliant")]
    NonCompliant,
    #[serde(rename = "Partially Compliant")]
    PartiallyCompliant,
    #[serde(rename = "Error")]
    Error,
}

impl ComplianceStatus {
    pub const ALL: [ComplianceStatus; 4] = [
        ComplianceStatus::Compliant,
        ComplianceStatus::NonCompliant,
        ComplianceStatus::PartiallyCompliant,
        ComplianceStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "Compliant",
            ComplianceStatus::NonCompliant => "Non-Compliant",
            ComplianceStatus::PartiallyCompliant => "Partially Compliant",
            ComplianceStatus::Error => "Error",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercases and drops everything but letters, so "Non-Compliant",
/// "non_compliant" and "NonCompliant" compare equal.
fn normalize_label(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for ComplianceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "compliant" => Ok(ComplianceStatus::Compliant),
            "noncompliant" => Ok(ComplianceStatus::NonCompliant),
            "partiallycompliant" | "partialcompliance" | "partial" => {
                Ok(ComplianceStatus::PartiallyCompliant)
            }
            "error" => Ok(ComplianceStatus::Error),
            _ => Err(format!("unknown compliance status '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        })
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            _ => Err(format!("unknown confidence '{s}'")),
        }
    }
}

/// Where a chunk came from: document name plus 1-based page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocator {
    pub document: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub content: String,
    pub source: SourceLocator,
}

impl TextChunk {
    pub fn new(content: impl Into<String>, document: impl Into<String>, page: u32) -> Self {
        Self {
            content: content.into(),
            source: SourceLocator {
                document: document.into(),
                page,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub rule_id: String,
    pub rule_name: String,
    #[serde(rename = "compliance_status")]
    pub status: ComplianceStatus,
    pub evidence: String,
    pub confidence: Confidence,
    pub remediation: String,
    pub category: String,
    pub severity: Severity,
    #[serde(default)]
    pub supporting_chunks: Vec<TextChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_parse_loosely() {
        for raw in ["Non-Compliant", "non_compliant", "NonCompliant", " NON COMPLIANT "] {
            assert_eq!(raw.parse::<ComplianceStatus>(), Ok(ComplianceStatus::NonCompliant));
        }
        assert_eq!(
            "Partially Compliant".parse::<ComplianceStatus>(),
            Ok(ComplianceStatus::PartiallyCompliant)
        );
        assert!("Maybe".parse::<ComplianceStatus>().is_err());
        assert!("Very High".parse::<Confidence>().is_err());
    }

    #[test]
    fn status_serializes_with_display_labels() {
        let json = serde_json::to_string(&ComplianceStatus::PartiallyCompliant).unwrap();
        assert_eq!(json, "\"Partially Compliant\"");
        for status in ComplianceStatus::ALL {
            assert_eq!(status.to_string(), status.as_str());
        }
    }
}
