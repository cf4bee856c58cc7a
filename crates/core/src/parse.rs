//! Pulls a verdict out of free-form model output.
//!
//! Models wrap their JSON in prose or markdown fences often enough that the
//! object has to be located first. Candidates are found with a brace scan that
//! understands JSON strings, so `{` and `}` inside string values never shift
//! the nesting depth.

use crate::error::ParseError;
use crate::models::{ComplianceStatus, Confidence};
use serde_json::{Map, Value};

/// The model-supplied part of a verdict. Everything else comes from the rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnswer {
    pub status: ComplianceStatus,
    pub evidence: String,
    pub confidence: Confidence,
    pub remediation: String,
}

/// Drops markdown fence markers around the answer. Only a fence opening a line
/// (with its language tag) or closing an object is removed; backticks inside
/// values are kept.
pub fn strip_fences(text: &str) -> String {
    text.lines().map(strip_fence_line).collect::<Vec<_>>().join("\n")
}

fn strip_fence_line(line: &str) -> &str {
    let trimmed = line.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        None => trimmed,
    };
    match body.strip_suffix("```") {
        Some(inner) if body.len() != trimmed.len() || inner.trim_end().ends_with('}') => inner,
        _ if body.len() != trimmed.len() => body,
        _ => line,
    }
}

/// End byte index (inclusive) of the balanced object starting at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced `{...}` substring that decodes to a JSON object.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    let cleaned = strip_fences(text);
    let bytes = cleaned.as_bytes();
    let mut last_error = None;
    let mut pos = 0;
    while let Some(rel) = cleaned[pos..].find('{') {
        let start = pos + rel;
        match balanced_end(bytes, start) {
            Some(end) => {
                match serde_json::from_str::<Value>(&cleaned[start..=end]) {
                    Ok(Value::Object(map)) => return Ok(map),
                    Ok(_) => {}
                    Err(e) => last_error = Some(e.to_string()),
                }
                pos = start + 1;
            }
            None => pos = start + 1,
        }
    }
    Err(match last_error {
        Some(e) => ParseError::Malformed(e),
        None => ParseError::NoJson,
    })
}

fn text_field(obj: &Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ParseError::InvalidValue {
                        field,
                        reason: "expected a list of strings".into(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join("\n")),
        Some(other) => Err(ParseError::InvalidValue {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

pub fn answer_from_object(obj: &Map<String, Value>) -> Result<ModelAnswer, ParseError> {
    let status = text_field(obj, "compliance_status")?
        .parse::<ComplianceStatus>()
        .map_err(|reason| ParseError::InvalidValue {
            field: "compliance_status",
            reason,
        })?;
    let confidence = text_field(obj, "confidence")?
        .parse::<Confidence>()
        .map_err(|reason| ParseError::InvalidValue {
            field: "confidence",
            reason,
        })?;
    let evidence = text_field(obj, "evidence")?;
    let remediation = match text_field(obj, "remediation") {
        Err(ParseError::MissingField(_)) => String::new(),
        other => other?,
    };
    Ok(ModelAnswer {
        status,
        evidence,
        confidence,
        remediation,
    })
}

pub fn parse_response(raw: &str) -> Result<ModelAnswer, ParseError> {
    answer_from_object(&extract_json_object(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"{"rule_id": "notices", "compliance_status": "Non-Compliant", "evidence": "No notice clause.", "confidence": "High", "remediation": "Add a notices section."}"#;

    #[test]
    fn bare_json_parses() {
        let answer = parse_response(BARE).unwrap();
        assert_eq!(answer.status, ComplianceStatus::NonCompliant);
        assert_eq!(answer.confidence, Confidence::High);
        assert_eq!(answer.remediation, "Add a notices section.");
    }

    #[test]
    fn prose_and_fences_do_not_change_the_result() {
        let fenced = format!("Here is my analysis:\n```json\n{BARE}\n```\nLet me know if anything else is needed.");
        assert_eq!(parse_response(&fenced), parse_response(BARE));
    }

    #[test]
    fn backticks_inside_values_survive_fence_removal() {
        let raw = "```json\n{\"compliance_status\": \"Compliant\", \"evidence\": \"Quoted as ```Section 5``` in the schedule.\", \"confidence\": \"High\"}\n```";
        let answer = parse_response(raw).unwrap();
        assert_eq!(answer.evidence, "Quoted as ```Section 5``` in the schedule.");

        let inline = format!("```{BARE}```");
        assert_eq!(parse_response(&inline), parse_response(BARE));
    }

    #[test]
    fn object_nested_in_invalid_wrapper_is_found() {
        let raw = r#"{ result: {"compliance_status": "Compliant", "evidence": "x", "confidence": "High"} }"#;
        let answer = parse_response(raw).unwrap();
        assert_eq!(answer.status, ComplianceStatus::Compliant);
        assert_eq!(answer.evidence, "x");
    }

    #[test]
    fn braces_inside_strings_are_literal() {
        let raw = r#"Result: {"compliance_status": "Compliant", "evidence": "Section 4 {Confidentiality} says \"keep {it} secret}\".", "confidence": "Medium", "remediation": "", "extra": {"nested": {"deep": [1, 2]}}} trailing {"#;
        let answer = parse_response(raw).unwrap();
        assert_eq!(answer.status, ComplianceStatus::Compliant);
        assert_eq!(
            answer.evidence,
            r#"Section 4 {Confidentiality} says "keep {it} secret}"."#
        );
    }

    #[test]
    fn skips_non_json_brace_groups() {
        let raw = format!("Using the {{template}} you gave: {BARE}");
        assert!(parse_response(&raw).is_ok());
    }

    #[test]
    fn no_object_is_reported() {
        assert_eq!(
            parse_response("The contract looks fine to me."),
            Err(ParseError::NoJson)
        );
        assert_eq!(parse_response("unbalanced { here"), Err(ParseError::NoJson));
    }

    #[test]
    fn malformed_object_is_reported() {
        let err = parse_response(r#"{"compliance_status": "Compliant",}"#).unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn missing_and_out_of_set_values_are_errors() {
        let err = parse_response(r#"{"evidence": "x", "confidence": "Low"}"#).unwrap_err();
        assert_eq!(err, ParseError::MissingField("compliance_status"));

        let err = parse_response(
            r#"{"compliance_status": "Probably fine", "evidence": "x", "confidence": "Low"}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidValue { field: "compliance_status", .. }
        ));
    }

    #[test]
    fn remediation_is_optional_and_evidence_lists_are_joined() {
        let answer = parse_response(
            r#"{"compliance_status": "Compliant", "evidence": ["Clause 9.1", "Clause 9.2"], "confidence": "high"}"#,
        )
        .unwrap();
        assert_eq!(answer.evidence, "Clause 9.1\nClause 9.2");
        assert_eq!(answer.remediation, "");
    }
}
