//! Report of per-rule verdicts and the views derived from it.

use crate::models::{ComplianceStatus, ComplianceVerdict};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_EVIDENCE_LIMIT: usize = 150;

/// Verdicts keyed by rule id, in the order rules were checked. Serializes as
/// a JSON object `{rule_id: verdict}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplianceReport {
    verdicts: Vec<ComplianceVerdict>,
}

impl ComplianceReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a verdict; a verdict for an already present rule replaces it in place.
    pub fn insert(&mut self, verdict: ComplianceVerdict) {
        match self.verdicts.iter_mut().find(|v| v.rule_id == verdict.rule_id) {
            Some(existing) => *existing = verdict,
            None => self.verdicts.push(verdict),
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<&ComplianceVerdict> {
        self.verdicts.iter().find(|v| v.rule_id == rule_id)
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComplianceVerdict> {
        self.verdicts.iter()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.verdicts.iter().map(|v| v.rule_id.as_str())
    }
}

impl FromIterator<ComplianceVerdict> for ComplianceReport {
    fn from_iter<I: IntoIterator<Item = ComplianceVerdict>>(iter: I) -> Self {
        let mut report = Self::new();
        for verdict in iter {
            report.insert(verdict);
        }
        report
    }
}

impl IntoIterator for ComplianceReport {
    type Item = ComplianceVerdict;
    type IntoIter = std::vec::IntoIter<ComplianceVerdict>;

    fn into_iter(self) -> Self::IntoIter {
        self.verdicts.into_iter()
    }
}

impl Serialize for ComplianceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.verdicts.len()))?;
        for verdict in &self.verdicts {
            map.serialize_entry(&verdict.rule_id, verdict)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ComplianceReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = ComplianceReport;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of rule id to verdict")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut report = ComplianceReport::new();
                while let Some((key, mut verdict)) =
                    access.next_entry::<String, ComplianceVerdict>()?
                {
                    verdict.rule_id = key;
                    report.insert(verdict);
                }
                Ok(report)
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}

/// Count per status; all four statuses are always present.
pub fn summary_counts(report: &ComplianceReport) -> BTreeMap<ComplianceStatus, usize> {
    let mut counts: BTreeMap<ComplianceStatus, usize> =
        ComplianceStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for verdict in report.iter() {
        *counts.entry(verdict.status).or_insert(0) += 1;
    }
    counts
}

pub fn filter_by_status(report: &ComplianceReport, statuses: &[ComplianceStatus]) -> ComplianceReport {
    report
        .iter()
        .filter(|v| statuses.contains(&v.status))
        .cloned()
        .collect()
}

/// Verdicts that need remediation work.
pub fn remediation_view(report: &ComplianceReport) -> ComplianceReport {
    filter_by_status(
        report,
        &[
            ComplianceStatus::NonCompliant,
            ComplianceStatus::PartiallyCompliant,
        ],
    )
}

pub fn to_json(report: &ComplianceReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn from_json(json: &str) -> serde_json::Result<ComplianceReport> {
    serde_json::from_str(json)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub rule_name: String,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub confidence: String,
    pub evidence: String,
}

pub const TABLE_HEADERS: [&str; 6] = [
    "Rule Name",
    "Category",
    "Severity",
    "Status",
    "Confidence",
    "Evidence",
];

impl TableRow {
    pub fn cells(&self) -> [&str; 6] {
        [
            self.rule_name.as_str(),
            self.category.as_str(),
            self.severity.as_str(),
            self.status.as_str(),
            self.confidence.as_str(),
            self.evidence.as_str(),
        ]
    }
}

/// Cuts `text` to `limit` chars and appends `...` when it is longer.
pub fn truncate_evidence(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

pub fn table_rows(report: &ComplianceReport, evidence_limit: usize) -> Vec<TableRow> {
    report
        .iter()
        .map(|v| TableRow {
            rule_name: v.rule_name.clone(),
            category: v.category.clone(),
            severity: v.severity.to_string(),
            status: v.status.to_string(),
            confidence: v.confidence.to_string(),
            evidence: truncate_evidence(&v.evidence, evidence_limit),
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(report: &ComplianceReport, evidence_limit: usize) -> String {
    let mut out = TABLE_HEADERS.join(",");
    out.push('\n');
    for row in table_rows(report, evidence_limit) {
        let line: Vec<String> = row.cells().iter().map(|c| csv_field(c)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Severity, TextChunk};

    fn verdict(id: &str, status: ComplianceStatus, evidence: &str) -> ComplianceVerdict {
        ComplianceVerdict {
            rule_id: id.to_string(),
            rule_name: format!("Rule {id}"),
            status,
            evidence: evidence.to_string(),
            confidence: Confidence::Medium,
            remediation: "Add the clause".to_string(),
            category: "Legal".to_string(),
            severity: Severity::High,
            supporting_chunks: vec![TextChunk::new("text", "c.pdf", 1)],
        }
    }

    fn sample() -> ComplianceReport {
        [
            verdict("a", ComplianceStatus::Compliant, "ok"),
            verdict("b", ComplianceStatus::NonCompliant, "missing"),
            verdict("c", ComplianceStatus::PartiallyCompliant, "partial"),
            verdict("d", ComplianceStatus::NonCompliant, "missing too"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn counts_are_zero_filled_and_sum_to_len() {
        let report = sample();
        let counts = summary_counts(&report);
        assert_eq!(counts.len(), 4);
        assert_eq!(counts[&ComplianceStatus::NonCompliant], 2);
        assert_eq!(counts[&ComplianceStatus::Error], 0);
        assert_eq!(counts.values().sum::<usize>(), report.len());

        let empty = summary_counts(&ComplianceReport::new());
        assert_eq!(empty.len(), 4);
        assert!(empty.values().all(|c| *c == 0));
    }

    #[test]
    fn reinsert_replaces_verdict_in_place() {
        let mut report = sample();
        report.insert(verdict("b", ComplianceStatus::Compliant, "fixed"));
        assert_eq!(report.len(), 4);
        assert_eq!(report.get("b").unwrap().status, ComplianceStatus::Compliant);
        assert_eq!(report.rule_ids().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn remediation_view_keeps_failing_rules_in_order() {
        let view = remediation_view(&sample());
        assert_eq!(view.rule_ids().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        let errors = filter_by_status(&sample(), &[ComplianceStatus::Error]);
        assert!(errors.is_empty());
    }

    #[test]
    fn csv_truncates_evidence_but_json_does_not() {
        let long = "x".repeat(200);
        let report: ComplianceReport = [verdict("a", ComplianceStatus::Compliant, &long)]
            .into_iter()
            .collect();

        let csv = to_csv(&report, 150);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.ends_with(&format!("{}...", "x".repeat(150))));
        assert!(!row.contains(&"x".repeat(151)));

        let json = to_json(&report).unwrap();
        assert!(json.contains(&long));
        let back = from_json(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn json_is_keyed_by_rule_id_with_wire_names() {
        let json = to_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["b"]["compliance_status"], "Non-Compliant");
        assert_eq!(value["c"]["compliance_status"], "Partially Compliant");
        assert_eq!(value["a"]["supporting_chunks"][0]["source"]["page"], 1);
    }

    #[test]
    fn csv_quotes_fields_with_commas_and_quotes() {
        let report: ComplianceReport =
            [verdict("a", ComplianceStatus::Compliant, "Clause 3, \"Term\"")]
                .into_iter()
                .collect();
        let csv = to_csv(&report, DEFAULT_EVIDENCE_LIMIT);
        assert_eq!(
            csv.lines().next().unwrap(),
            "Rule Name,Category,Severity,Status,Confidence,Evidence"
        );
        assert!(csv.contains("\"Clause 3, \"\"Term\"\"\""));
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        assert_eq!(truncate_evidence("§§§§", 2), "§§...");
        assert_eq!(truncate_evidence("short", 150), "short");
    }
}
