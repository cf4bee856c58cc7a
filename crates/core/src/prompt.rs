//! Retrieval query and instruction prompt for a single rule.

use crate::catalog::Rule;
use crate::models::TextChunk;

pub const QUERY_SUFFIX: &str = "What specific clauses or language addresses this requirement?";

/// Context handed to the model when retrieval produced nothing.
pub const NO_CONTEXT: &str = "No relevant sections found in the document.";

pub fn build_query(rule: &Rule) -> String {
    format!("{} {}", rule.description.trim(), QUERY_SUFFIX)
}

/// Chunk contents in retrieval order, separated by blank lines.
pub fn build_context(chunks: &[TextChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|c| c.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(rule: &Rule, context: &str) -> String {
    format!(
        r#"You are reviewing a contract. Analyze the contract sections below and determine whether they satisfy this compliance rule.

RULE: {name}
DESCRIPTION: {description}
CATEGORY: {category}
SEVERITY: {severity}

CONTRACT SECTIONS:
{context}

Assess the rule and answer with:
- compliance_status: exactly one of "Compliant", "Non-Compliant", "Partially Compliant", "Error"
- evidence: the specific contract text supporting the assessment
- confidence: exactly one of "High", "Medium", "Low"
- remediation: what should be added or changed if not fully compliant

If the sections say no relevant text was found, treat the requirement as unaddressed.

Respond with a single JSON object and nothing else:
{{
    "rule_id": "{id}",
    "rule_name": "{name}",
    "compliance_status": "Compliant | Non-Compliant | Partially Compliant | Error",
    "evidence": "text evidence",
    "confidence": "High | Medium | Low",
    "remediation": "remediation steps",
    "category": "{category}",
    "severity": "{severity}"
}}"#,
        id = rule.id,
        name = rule.name,
        description = rule.description,
        category = rule.category,
        severity = rule.severity,
        context = context,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn rule() -> Rule {
        Rule::new(
            "governing_law",
            "Governing Law Clause",
            "Contract must specify the governing law jurisdiction",
            "Legal",
            Severity::Medium,
        )
    }

    #[test]
    fn query_is_description_plus_instruction() {
        assert_eq!(
            build_query(&rule()),
            "Contract must specify the governing law jurisdiction What specific clauses or language addresses this requirement?"
        );
    }

    #[test]
    fn empty_retrieval_gets_sentinel_context() {
        assert_eq!(build_context(&[]), NO_CONTEXT);
        let chunks = vec![
            TextChunk::new("first ", "c.pdf", 1),
            TextChunk::new("second", "c.pdf", 2),
        ];
        assert_eq!(build_context(&chunks), "first\n\nsecond");
    }

    #[test]
    fn prompt_states_fields_and_closed_sets() {
        let prompt = build_prompt(&rule(), "Delaware law governs.");
        for needle in [
            "RULE: Governing Law Clause",
            "CATEGORY: Legal",
            "SEVERITY: Medium",
            "Delaware law governs.",
            "\"rule_id\": \"governing_law\"",
            "\"Compliant\", \"Non-Compliant\", \"Partially Compliant\", \"Error\"",
            "\"High\", \"Medium\", \"Low\"",
            "\"remediation\"",
        ] {
            assert!(prompt.contains(needle), "prompt missing {needle:?}");
        }
    }
}
