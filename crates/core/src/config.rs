use crate::checker::DEFAULT_TOP_K;
use crate::report::DEFAULT_EVIDENCE_LIMIT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub generation: GenerationConfig,
    pub embeddings: EmbeddingConfig,
    pub vectors: VectorConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
    pub rules: RuleConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/compliance.db".to_string(),
        }
    }
}

/// Which hosted model judges compliance. Credentials come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-pro".to_string(),
            base_url: None,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "noop".to_string(),
            model: "text-embedding-3-small".to_string(),
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub provider: String,
    pub url: Option<String>,
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            url: None,
            collection: "contracts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub path: Option<String>,
    pub include_builtin: bool,
    /// Rule ids to check; empty means the whole catalog.
    pub selected: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            path: None,
            include_builtin: true,
            selected: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub evidence_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            evidence_limit: DEFAULT_EVIDENCE_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be at least 1");
        anyhow::ensure!(
            self.ingest.chunk_size > 0,
            "ingest.chunk_size must be at least 1"
        );
        anyhow::ensure!(
            self.ingest.chunk_overlap < self.ingest.chunk_size,
            "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
            self.ingest.chunk_overlap,
            self.ingest.chunk_size
        );
        anyhow::ensure!(
            self.embeddings.batch_size > 0,
            "embeddings.batch_size must be at least 1"
        );
        Ok(())
    }
}

/// Reads `path` (or `config/default` when present), then `CONTRACT_CHECK__*`
/// environment overrides, e.g. `CONTRACT_CHECK__RETRIEVAL__TOP_K=8`.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("CONTRACT_CHECK")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg: AppConfig = settings.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(
            &path,
            r#"
                [retrieval]
                top_k = 8

                [generation]
                provider = "openai"
                model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        let cfg = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.retrieval.top_k, 8);
        assert_eq!(cfg.generation.provider, "openai");
        assert_eq!(cfg.ingest.chunk_size, 1000);
        assert_eq!(cfg.report.evidence_limit, 150);
        assert!(cfg.rules.include_builtin);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.ingest.chunk_overlap = cfg.ingest.chunk_size;
        assert!(cfg.validate().is_err());
        cfg = AppConfig::default();
        cfg.retrieval.top_k = 0;
        assert!(cfg.validate().is_err());
    }
}
