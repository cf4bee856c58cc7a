//! Plain-text rendering for terminal output.

use compliance_core::catalog::Rule;
use compliance_core::models::ComplianceStatus;
use compliance_core::report::{summary_counts, table_rows, ComplianceReport, TABLE_HEADERS};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use storage::DocumentSummary;

/// Splits a comma separated flag value, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_statuses(raw: &[String]) -> anyhow::Result<Vec<ComplianceStatus>> {
    raw.iter()
        .map(|s| s.parse::<ComplianceStatus>().map_err(anyhow::Error::msg))
        .collect()
}

pub fn render_summary(report: &ComplianceReport) -> String {
    let mut out = String::new();
    for (status, count) in summary_counts(report) {
        let _ = writeln!(out, "{:<20} {}", status.as_str(), count);
    }
    let _ = writeln!(out, "{:<20} {}", "Total", report.len());
    out
}

/// Left-aligned columns sized to their widest cell.
pub fn render_table(report: &ComplianceReport, evidence_limit: usize) -> String {
    let rows = table_rows(report, evidence_limit);
    let mut widths: Vec<usize> = TABLE_HEADERS.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.cells()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c.replace('\n', " "), w = *w))
            .collect();
        padded.join(" | ").trim_end().to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&TABLE_HEADERS[..]));
    let total: usize = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
    let _ = writeln!(out, "{}", "-".repeat(total));
    for row in &rows {
        let _ = writeln!(out, "{}", line(&row.cells()[..]));
    }
    out
}

pub fn render_remediation(report: &ComplianceReport) -> String {
    if report.is_empty() {
        return "No remediation needed.\n".to_string();
    }
    let mut out = String::new();
    for v in report.iter() {
        let _ = writeln!(out, "[{}] {} ({})", v.severity, v.rule_name, v.status);
        let _ = writeln!(out, "  Category:    {}", v.category);
        let _ = writeln!(out, "  Evidence:    {}", v.evidence);
        let remediation = if v.remediation.is_empty() {
            "-"
        } else {
            v.remediation.as_str()
        };
        let _ = writeln!(out, "  Remediation: {}", remediation);
        out.push('\n');
    }
    out
}

/// One heading per category, then each rule's id, severity, name and description.
pub fn render_rules(groups: &BTreeMap<&str, Vec<&Rule>>) -> String {
    let mut out = String::new();
    for (category, rules) in groups {
        let _ = writeln!(out, "{category}");
        for r in rules {
            let _ = writeln!(out, "  {:<24} {:<6} {}", r.id, r.severity.to_string(), r.name);
            let _ = writeln!(out, "  {:<24} {}", "", r.description);
        }
    }
    out
}

pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub fn render_documents(docs: &[DocumentSummary]) -> String {
    if docs.is_empty() {
        return "No stored reports.\n".to_string();
    }
    let mut out = String::new();
    for d in docs {
        let _ = writeln!(
            out,
            "{}  rules={} errors={} checked={}",
            d.document,
            d.rules,
            d.errors,
            format_timestamp(d.last_checked)
        );
    }
    out
}
