//! Per-rule compliance checking: retrieve, prompt, generate, parse.
//!
//! `check_rule` never fails. Retrieval errors degrade to an empty context and
//! generation or parse errors become an `Error` verdict, so one bad rule can
//! not take down the rest of a batch.

use crate::catalog::Rule;
use crate::error::{CatalogError, CheckError};
use crate::models::{ComplianceStatus, ComplianceVerdict, Confidence, TextChunk};
use crate::parse::{parse_response, ModelAnswer};
use crate::prompt::{build_context, build_prompt, build_query};
use crate::report::ComplianceReport;
use crate::vectorstore::DocumentStore;
use providers::LlmProvider;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TOP_K: usize = 5;
pub const MANUAL_REVIEW: &str = "manual review required";

/// Progress after each checked rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub rule_id: &'a str,
    pub status: ComplianceStatus,
}

impl Progress<'_> {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

pub struct ComplianceChecker {
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
}

impl ComplianceChecker {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    async fn retrieve(&self, rule: &Rule, store: &dyn DocumentStore) -> Vec<TextChunk> {
        let query = build_query(rule);
        match store.search(&query, self.top_k).await {
            Ok(mut chunks) => {
                chunks.truncate(self.top_k);
                chunks
            }
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    pub async fn check_rule(&self, rule: &Rule, store: &dyn DocumentStore) -> ComplianceVerdict {
        let chunks = self.retrieve(rule, store).await;
        debug!(rule = %rule.id, chunks = chunks.len(), "retrieved context");
        let prompt = build_prompt(rule, &build_context(&chunks));

        let raw = match self.llm.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(rule = %rule.id, error = %e, "generation failed");
                return error_verdict(rule, &format!("generation failed: {e}"), chunks);
            }
        };

        match parse_response(&raw) {
            Ok(answer) => verdict_from_answer(rule, answer, chunks),
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "could not parse model response");
                error_verdict(rule, &format!("could not parse model response: {e}"), chunks)
            }
        }
    }

    /// Checks `rules` one after another, in order. Fails only on an invalid
    /// selection, before any rule is checked.
    pub async fn check_all<F>(
        &self,
        rules: &[Rule],
        store: &dyn DocumentStore,
        mut on_progress: F,
    ) -> Result<ComplianceReport, CheckError>
    where
        F: FnMut(Progress<'_>),
    {
        if rules.is_empty() {
            return Err(CheckError::NoRulesSelected);
        }
        let mut seen = HashSet::new();
        for rule in rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(CatalogError::DuplicateRule(rule.id.clone()).into());
            }
        }

        info!(rules = rules.len(), top_k = self.top_k, "starting compliance check");
        let mut report = ComplianceReport::new();
        for (i, rule) in rules.iter().enumerate() {
            let verdict = self.check_rule(rule, store).await;
            let status = verdict.status;
            report.insert(verdict);
            on_progress(Progress {
                completed: i + 1,
                total: rules.len(),
                rule_id: &rule.id,
                status,
            });
        }
        info!(
            rules = report.len(),
            errors = report.iter().filter(|v| v.status == ComplianceStatus::Error).count(),
            "compliance check finished"
        );
        Ok(report)
    }
}

/// Model answer plus the rule's canonical metadata. The model's echo of
/// id, name, category and severity is ignored.
fn verdict_from_answer(rule: &Rule, answer: ModelAnswer, chunks: Vec<TextChunk>) -> ComplianceVerdict {
    ComplianceVerdict {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        status: answer.status,
        evidence: answer.evidence,
        confidence: answer.confidence,
        remediation: answer.remediation,
        category: rule.category.clone(),
        severity: rule.severity,
        supporting_chunks: chunks,
    }
}

pub fn error_verdict(rule: &Rule, cause: &str, chunks: Vec<TextChunk>) -> ComplianceVerdict {
    ComplianceVerdict {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        status: ComplianceStatus::Error,
        evidence: format!("Analysis error: {cause}"),
        confidence: Confidence::Low,
        remediation: MANUAL_REVIEW.to_string(),
        category: rule.category.clone(),
        severity: rule.severity,
        supporting_chunks: chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleCatalog;
    use crate::models::Severity;
    use providers::ProviderError;
    use std::sync::Mutex;

    struct FixedStore(Vec<TextChunk>);

    #[async_trait::async_trait]
    impl DocumentStore for FixedStore {
        async fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<TextChunk>> {
            Ok(self.0.clone())
        }
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl DocumentStore for FailingStore {
        async fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<TextChunk>> {
            anyhow::bail!("index unavailable")
        }
    }

    /// Returns a canned response and records every prompt it sees.
    struct ScriptedLlm {
        response: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err("quota exceeded".to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.response
                .clone()
                .map_err(ProviderError::RequestFailed)
        }
    }

    fn rule() -> Rule {
        Rule::new(
            "termination_clause",
            "Termination Clause",
            "Document must include termination conditions and notice period",
            "Termination",
            Severity::High,
        )
    }

    fn chunk() -> TextChunk {
        TextChunk::new("Either party may terminate on 30 days notice.", "c.pdf", 4)
    }

    #[tokio::test]
    async fn model_echo_of_metadata_is_overridden() {
        let llm = ScriptedLlm::ok(
            r#"{"rule_id": "other", "rule_name": "Other", "compliance_status": "Compliant", "evidence": "Clause 12", "confidence": "High", "remediation": "None", "category": "Bogus", "severity": "Low"}"#,
        );
        let checker = ComplianceChecker::new(llm);
        let verdict = checker.check_rule(&rule(), &FixedStore(vec![chunk()])).await;
        assert_eq!(verdict.status, ComplianceStatus::Compliant);
        assert_eq!(verdict.rule_id, "termination_clause");
        assert_eq!(verdict.category, "Termination");
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.supporting_chunks, vec![chunk()]);
    }

    #[tokio::test]
    async fn generation_failure_becomes_error_verdict_with_chunks() {
        let checker = ComplianceChecker::new(ScriptedLlm::failing());
        let verdict = checker.check_rule(&rule(), &FixedStore(vec![chunk()])).await;
        assert_eq!(verdict.status, ComplianceStatus::Error);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert_eq!(verdict.remediation, MANUAL_REVIEW);
        assert!(verdict.evidence.contains("quota exceeded"));
        assert_eq!(verdict.supporting_chunks.len(), 1);
        assert_eq!(verdict.severity, Severity::High);
    }

    #[tokio::test]
    async fn response_without_json_becomes_error_verdict() {
        let checker = ComplianceChecker::new(ScriptedLlm::ok("I cannot help with that."));
        let verdict = checker.check_rule(&rule(), &FixedStore(vec![])).await;
        assert_eq!(verdict.status, ComplianceStatus::Error);
        assert_eq!(verdict.remediation, MANUAL_REVIEW);
        assert!(verdict.evidence.contains("no JSON object"));
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_sentinel_context() {
        let llm = ScriptedLlm::ok(
            r#"{"compliance_status": "Non-Compliant", "evidence": "Nothing found", "confidence": "Medium", "remediation": "Add a termination clause"}"#,
        );
        let checker = ComplianceChecker::new(llm.clone());
        let verdict = checker.check_rule(&rule(), &FailingStore).await;
        assert_eq!(verdict.status, ComplianceStatus::NonCompliant);
        assert!(verdict.supporting_chunks.is_empty());
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains(crate::prompt::NO_CONTEXT));
    }

    #[tokio::test]
    async fn store_results_are_capped_at_top_k() {
        let llm = ScriptedLlm::ok("no json");
        let checker = ComplianceChecker::new(llm).with_top_k(2);
        let store = FixedStore(vec![chunk(), chunk(), chunk()]);
        let verdict = checker.check_rule(&rule(), &store).await;
        assert_eq!(verdict.supporting_chunks.len(), 2);
    }

    #[tokio::test]
    async fn check_all_yields_one_verdict_per_rule_even_when_all_fail() {
        let catalog = RuleCatalog::builtin();
        let checker = ComplianceChecker::new(ScriptedLlm::failing());
        let mut fractions = Vec::new();
        let report = checker
            .check_all(catalog.rules(), &FixedStore(vec![]), |p| {
                fractions.push(p.fraction())
            })
            .await
            .unwrap();
        assert_eq!(report.len(), catalog.len());
        let ids: Vec<&str> = report.iter().map(|v| v.rule_id.as_str()).collect();
        let expected: Vec<&str> = catalog.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(report.iter().all(|v| v.status == ComplianceStatus::Error));
        assert_eq!(fractions.len(), catalog.len());
        assert_eq!(*fractions.last().unwrap(), 1.0);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn check_all_rejects_empty_and_duplicate_selection() {
        let checker = ComplianceChecker::new(ScriptedLlm::failing());
        let err = checker
            .check_all(&[], &FixedStore(vec![]), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::NoRulesSelected));

        let err = checker
            .check_all(&[rule(), rule()], &FixedStore(vec![]), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Catalog(CatalogError::DuplicateRule(_))));
    }
}
