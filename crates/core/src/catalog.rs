//! The rule catalog: built-in contract rules plus optional TOML rule files.

use crate::error::CatalogError;
use crate::models::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
}

impl Rule {
    pub fn new(id: &str, name: &str, description: &str, category: &str, severity: Severity) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            severity,
        }
    }
}

const BUILTIN: &[(&str, &str, &str, &str, Severity)] = &[
    (
        "confidentiality_clause",
        "Confidentiality Clause Presence",
        "Document must contain a confidentiality clause protecting sensitive information",
        "Confidentiality",
        Severity::High,
    ),
    (
        "term_duration",
        "Contract Term Duration",
        "Contract must specify a clear start and end date or duration",
        "Term",
        Severity::High,
    ),
    (
        "termination_clause",
        "Termination Clause",
        "Document must include termination conditions and notice period",
        "Termination",
        Severity::High,
    ),
    (
        "governing_law",
        "Governing Law Clause",
        "Contract must specify the governing law jurisdiction",
        "Legal",
        Severity::Medium,
    ),
    (
        "indemnification",
        "Indemnification Clause",
        "Must include indemnification provisions for liability protection",
        "Liability",
        Severity::High,
    ),
    (
        "ip_ownership",
        "Intellectual Property Ownership",
        "Clearly defines ownership of intellectual property created during contract",
        "Intellectual Property",
        Severity::High,
    ),
    (
        "payment_terms",
        "Payment Terms",
        "Specifies payment amounts, schedules, and methods",
        "Financial",
        Severity::High,
    ),
    (
        "warranties",
        "Warranties and Representations",
        "Includes appropriate warranties and representations",
        "Liability",
        Severity::Medium,
    ),
    (
        "limitation_liability",
        "Limitation of Liability",
        "Includes reasonable limitation of liability clauses",
        "Liability",
        Severity::Medium,
    ),
    (
        "dispute_resolution",
        "Dispute Resolution Mechanism",
        "Specifies dispute resolution process (arbitration, mediation, litigation)",
        "Legal",
        Severity::Medium,
    ),
    (
        "assignment_clause",
        "Assignment Clause",
        "Addresses whether contract can be assigned to third parties",
        "Transfer",
        Severity::Low,
    ),
    (
        "force_majeure",
        "Force Majeure Clause",
        "Includes force majeure provisions for unforeseen circumstances",
        "Risk",
        Severity::Medium,
    ),
    (
        "notices",
        "Notices Provision",
        "Specifies how formal notices should be delivered",
        "Administrative",
        Severity::Low,
    ),
    (
        "entire_agreement",
        "Entire Agreement Clause",
        "States that the document represents the entire agreement",
        "Legal",
        Severity::Medium,
    ),
    (
        "severability",
        "Severability Clause",
        "Includes severability clause for invalid provisions",
        "Legal",
        Severity::Low,
    ),
    (
        "amendment_process",
        "Amendment Process",
        "Specifies how the contract can be amended",
        "Administrative",
        Severity::Low,
    ),
];

/// Ordered, id-unique set of rules. Order is the check order.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl RuleCatalog {
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN
                .iter()
                .map(|(id, name, desc, cat, sev)| Rule::new(id, name, desc, cat, *sev))
                .collect(),
        }
    }

    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            validate_rule(rule)?;
            if !seen.insert(rule.id.as_str()) {
                return Err(CatalogError::DuplicateRule(rule.id.clone()));
            }
        }
        Ok(Self { rules })
    }

    /// Builds the catalog from config: built-in rules (unless disabled), then
    /// rule files from `dir`. A file rule with a built-in id replaces it in place.
    pub fn load(dir: Option<&Path>, include_builtin: bool) -> Result<Self, CatalogError> {
        let mut rules = if include_builtin {
            Self::builtin().rules
        } else {
            Vec::new()
        };
        if let Some(dir) = dir {
            for rule in load_rules_from_dir(dir)? {
                match rules.iter_mut().find(|r| r.id == rule.id) {
                    Some(existing) => *existing = rule,
                    None => rules.push(rule),
                }
            }
        }
        Self::from_rules(rules)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Rules named by `ids`, in catalog order. An empty list selects everything.
    pub fn select(&self, ids: &[String]) -> Result<Vec<Rule>, CatalogError> {
        if ids.is_empty() {
            return Ok(self.rules.clone());
        }
        let wanted: HashSet<&str> = ids.iter().map(|s| s.trim()).collect();
        for id in &wanted {
            if self.get(id).is_none() {
                return Err(CatalogError::UnknownRule(id.to_string()));
            }
        }
        Ok(self
            .rules
            .iter()
            .filter(|r| wanted.contains(r.id.as_str()))
            .cloned()
            .collect())
    }

    pub fn by_category(&self) -> BTreeMap<&str, Vec<&Rule>> {
        let mut groups: BTreeMap<&str, Vec<&Rule>> = BTreeMap::new();
        for rule in &self.rules {
            groups.entry(rule.category.as_str()).or_default().push(rule);
        }
        groups
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate_rule(rule: &Rule) -> Result<(), CatalogError> {
    let missing = |field| CatalogError::MissingField {
        id: rule.id.clone(),
        field,
    };
    if rule.id.trim().is_empty() {
        return Err(missing("id"));
    }
    if rule.name.trim().is_empty() {
        return Err(missing("name"));
    }
    if rule.description.trim().is_empty() {
        return Err(missing("description"));
    }
    if rule.category.trim().is_empty() {
        return Err(missing("category"));
    }
    Ok(())
}

/// Reads every `*.toml` file in `dir` as one rule, sorted by file name.
pub fn load_rules_from_dir(dir: &Path) -> Result<Vec<Rule>, CatalogError> {
    let io_err = |path: &Path, source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut rules = Vec::new();
    if !dir.exists() {
        return Ok(rules);
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in paths {
        let content = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let rule: Rule = toml::from_str(&content).map_err(|source| CatalogError::Toml {
            path: path.display().to_string(),
            source,
        })?;
        rules.push(rule);
    }
    Ok(rules)
}
