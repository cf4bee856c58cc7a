//! Error types for the core crate

use thiserror::Error;

/// Problems with the rule set, surfaced before any rule is checked.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),
    #[error("unknown rule id: {0}")]
    UnknownRule(String),
    #[error("rule {id} is missing a {field}")]
    MissingField { id: String, field: &'static str },
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rule file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no rules selected")]
    NoRulesSelected,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Why a model response could not be turned into a verdict.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
