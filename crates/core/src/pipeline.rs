use crate::catalog::{Rule, RuleCatalog};
use crate::checker::{ComplianceChecker, Progress};
use crate::config::AppConfig;
use crate::error::CheckError;
use crate::ingest::{document_name, load_document, TextSplitter};
use crate::models::{ComplianceStatus, ComplianceVerdict, TextChunk};
use crate::report::ComplianceReport;
use crate::vectorstore::{DocumentStore, KeywordIndex, QdrantStore, VectorIndex};
use anyhow::Context;
use providers::gemini::{GeminiConfig, GeminiProvider, DEFAULT_BASE_URL};
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::qdrant::QdrantClient;
use providers::ProviderRegistry;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use storage::{connect, load_verdicts, migrate, save_verdicts, VerdictRow};
use tracing::{debug, info, warn};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";

/// What one `check` run produced.
#[derive(Debug)]
pub struct CheckOutcome {
    pub document: String,
    pub pages: usize,
    pub chunks: usize,
    pub report: ComplianceReport,
    /// Catalog the rules were selected from; fixes each verdict's stored position.
    pub catalog: RuleCatalog,
}

/// Registers every provider whose credentials are present in the environment.
pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new()
        .with_embedding("noop", Arc::new(NoopProvider))
        .with_llm("noop", Arc::new(NoopProvider));

    let gen = &config.generation;
    if let Some(key) = std::env::var_os("OPENAI_API_KEY") {
        let base = std::env::var("OPENAI_BASE_URL")
            .ok()
            .or_else(|| gen.base_url.clone().filter(|_| gen.provider == "openai"))
            .unwrap_or_else(|| OPENAI_DEFAULT_BASE.to_string());
        let chat_model = if gen.provider == "openai" {
            gen.model.clone()
        } else {
            "gpt-4o-mini".to_string()
        };
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base,
            embedding_model: config.embeddings.model.clone(),
            chat_model,
            temperature: gen.temperature,
        });
        reg = reg
            .with_embedding("openai", Arc::new(provider.clone()))
            .with_llm("openai", Arc::new(provider));
    }

    if let Some(key) = std::env::var_os("GOOGLE_API_KEY") {
        let model = if gen.provider == "gemini" {
            gen.model.clone()
        } else {
            "gemini-pro".to_string()
        };
        let provider = GeminiProvider::new(GeminiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: gen
                .base_url
                .clone()
                .filter(|_| gen.provider == "gemini")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            temperature: gen.temperature,
        });
        reg = reg.with_llm("gemini", Arc::new(provider));
    }

    reg.set_preferred_embedding(&config.embeddings.provider)
        .set_preferred_llm(&gen.provider)
}

/// Indexes `chunks` in the configured store. Without an embedding model the
/// keyword index is used.
pub async fn build_document_store(
    config: &AppConfig,
    registry: &ProviderRegistry,
    document: &str,
    chunks: Vec<TextChunk>,
) -> anyhow::Result<Box<dyn DocumentStore>> {
    if chunks.is_empty() {
        warn!(document, "document has no text, rules will be checked without context");
        return Ok(Box::new(KeywordIndex::new(chunks)?));
    }
    if config.embeddings.provider == "noop" {
        debug!("no embedding provider configured, using keyword index");
        return Ok(Box::new(KeywordIndex::new(chunks)?));
    }
    let embedder = registry
        .embedding(None)
        .with_context(|| format!("embedding provider '{}'", config.embeddings.provider))?;
    let batch = config.embeddings.batch_size;

    match (config.vectors.provider.as_str(), &config.vectors.url) {
        ("qdrant", Some(url)) => {
            let client = QdrantClient::new(providers::qdrant::QdrantConfig {
                url: url.clone(),
                collection: config.vectors.collection.clone(),
                api_key: std::env::var("QDRANT_API_KEY").ok(),
            });
            let store = QdrantStore::new(client, embedder, document);
            store.index(&chunks, batch).await?;
            Ok(Box::new(store))
        }
        ("qdrant", None) => {
            warn!("vectors.provider is qdrant but vectors.url is unset, using in-memory index");
            Ok(Box::new(VectorIndex::build(embedder, chunks, batch).await?))
        }
        _ => Ok(Box::new(VectorIndex::build(embedder, chunks, batch).await?)),
    }
}

pub fn load_catalog(config: &AppConfig) -> anyhow::Result<RuleCatalog> {
    let dir = config.rules.path.as_deref().map(Path::new);
    let catalog = RuleCatalog::load(dir, config.rules.include_builtin)?;
    debug!(rules = catalog.len(), "rule catalog loaded");
    Ok(catalog)
}

/// Rules for this run: `ids` when given, else `rules.selected`, else the whole catalog.
pub fn select_rules(config: &AppConfig, ids: &[String]) -> anyhow::Result<Vec<Rule>> {
    select_from(&load_catalog(config)?, config, ids)
}

fn select_from(catalog: &RuleCatalog, config: &AppConfig, ids: &[String]) -> anyhow::Result<Vec<Rule>> {
    let ids = if ids.is_empty() {
        &config.rules.selected
    } else {
        ids
    };
    let rules = catalog.select(ids)?;
    if rules.is_empty() {
        return Err(CheckError::NoRulesSelected.into());
    }
    Ok(rules)
}

/// Loads, splits and indexes `path`, then checks every selected rule against it.
pub async fn check_document<F>(
    config: &AppConfig,
    registry: &ProviderRegistry,
    path: &Path,
    rule_ids: &[String],
    on_progress: F,
) -> anyhow::Result<CheckOutcome>
where
    F: FnMut(Progress<'_>),
{
    let catalog = load_catalog(config)?;
    let rules = select_from(&catalog, config, rule_ids)?;
    let llm = registry
        .llm(None)
        .with_context(|| format!("generation provider '{}'", config.generation.provider))?;

    let document = document_name(path);
    let pages = load_document(path).with_context(|| format!("load {}", path.display()))?;
    let splitter = TextSplitter::new(config.ingest.chunk_size, config.ingest.chunk_overlap);
    let chunks = splitter.split_pages(&pages);
    info!(document = %document, pages = pages.len(), chunks = chunks.len(), "document ingested");
    let chunk_count = chunks.len();

    let store = build_document_store(config, registry, &document, chunks).await?;
    let checker = ComplianceChecker::new(llm).with_top_k(config.retrieval.top_k);
    let report = checker.check_all(&rules, store.as_ref(), on_progress).await?;

    Ok(CheckOutcome {
        document,
        pages: pages.len(),
        chunks: chunk_count,
        report,
        catalog,
    })
}

pub async fn run_check<F>(
    config: &AppConfig,
    path: &Path,
    rule_ids: &[String],
    on_progress: F,
) -> anyhow::Result<CheckOutcome>
where
    F: FnMut(Progress<'_>),
{
    let registry = build_registry(config);
    check_document(config, &registry, path, rule_ids, on_progress).await
}

pub async fn open_database(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    let pool = connect(&config.database.path).await.context("db connect")?;
    migrate(&pool).await.context("db migrate")?;
    Ok(pool)
}

/// Stores every verdict of `report` under `document`, replacing earlier ones.
/// Rows are positioned by catalog index so partial re-checks keep catalog order.
pub async fn save_report(
    pool: &SqlitePool,
    document: &str,
    report: &ComplianceReport,
    catalog: &RuleCatalog,
) -> anyhow::Result<()> {
    let now = chrono::Utc::now().timestamp();
    let rows = report
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Ok(VerdictRow {
                rule_id: v.rule_id.clone(),
                position: catalog_position(catalog, &v.rule_id).unwrap_or(catalog.len() + i) as i64,
                status: v.status.as_str().to_string(),
                payload_json: serde_json::to_string(v)?,
                checked_at: now,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    save_verdicts(pool, document, &rows).await?;
    info!(document, verdicts = rows.len(), "report saved");
    Ok(())
}

fn catalog_position(catalog: &RuleCatalog, rule_id: &str) -> Option<usize> {
    catalog.rules().iter().position(|r| r.id == rule_id)
}

/// The stored report for `document`, limited to `statuses` when non-empty.
pub async fn load_report(
    pool: &SqlitePool,
    document: &str,
    statuses: &[ComplianceStatus],
) -> anyhow::Result<ComplianceReport> {
    let wanted: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    load_verdicts(pool, document, &wanted)
        .await?
        .into_iter()
        .map(|row| {
            serde_json::from_str::<ComplianceVerdict>(&row.payload_json)
                .with_context(|| format!("stored verdict {} for {document}", row.rule_id))
        })
        .collect()
}
