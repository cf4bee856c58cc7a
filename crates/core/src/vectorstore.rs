//! Document stores: anything that answers "top-k chunks for this query".

use crate::embeddings::{cosine_similarity, embed_batched};
use crate::models::TextChunk;
use anyhow::Context;
use providers::qdrant::{match_filter, QdrantClient, QdrantPoint};
use providers::EmbeddingProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::doc;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED,
};
use tantivy::{Document, Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info};

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Most relevant chunks first, at most `k` of them.
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<TextChunk>>;
}

/// In-memory embedding index with cosine ranking.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: Vec<(TextChunk, Vec<f32>)>,
}

impl VectorIndex {
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        chunks: Vec<TextChunk>,
        batch_size: usize,
    ) -> anyhow::Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_batched(&embedder, &texts, batch_size).await?;
        info!(chunks = chunks.len(), "built in-memory vector index");
        Ok(Self {
            embedder,
            entries: chunks.into_iter().zip(vectors).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl DocumentStore for VectorIndex {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<TextChunk>> {
        let query_vec = embed_batched(&self.embedder, &[query.to_string()], 1)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let mut scored: Vec<(f32, &TextChunk)> = self
            .entries
            .iter()
            .map(|(chunk, v)| (cosine_similarity(&query_vec, v), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, c)| c.clone()).collect())
    }
}

/// Lowercased words only, so punctuation and `AND`/`OR`/`NOT` in rule text
/// never reach the query grammar.
fn plain_query(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// BM25 keyword search over an in-RAM tantivy index, for when no embedding
/// model is configured. Terms are stemmed (`en_stem`), so "terminate" matches
/// "termination".
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    content: Field,
    page: Field,
    document: Field,
    len: usize,
}

impl KeywordIndex {
    pub fn new(chunks: Vec<TextChunk>) -> anyhow::Result<Self> {
        let mut schema_builder = Schema::builder();
        let indexing = TextFieldIndexing::default()
            .set_tokenizer("en_stem")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let content = schema_builder.add_text_field(
            "content",
            TextOptions::default()
                .set_indexing_options(indexing)
                .set_stored(),
        );
        let page = schema_builder.add_u64_field("page", STORED);
        let document = schema_builder.add_text_field("document", STORED);
        let index = Index::create_in_ram(schema_builder.build());

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, 20_000_000)
            .context("keyword index writer")?;
        for chunk in &chunks {
            writer.add_document(doc!(
                content => chunk.content.as_str(),
                page => u64::from(chunk.source.page),
                document => chunk.source.document.as_str()
            ))?;
        }
        writer.commit().context("keyword index commit")?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("keyword index reader")?;
        debug!(chunks = chunks.len(), "built keyword index");
        Ok(Self {
            index,
            reader,
            content,
            page,
            document,
            len: chunks.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn to_chunk(&self, doc: &Document) -> Option<TextChunk> {
        let content = doc.get_first(self.content)?.as_text()?;
        let page = doc.get_first(self.page).and_then(|v| v.as_u64()).unwrap_or(0);
        let document = doc
            .get_first(self.document)
            .and_then(|v| v.as_text())
            .unwrap_or_default();
        Some(TextChunk::new(content, document, page as u32))
    }
}

#[async_trait::async_trait]
impl DocumentStore for KeywordIndex {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<TextChunk>> {
        let query = plain_query(query);
        if query.is_empty() || self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let parser = QueryParser::for_index(&self.index, vec![self.content]);
        let parsed = parser.parse_query(&query)?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(k))?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (_score, addr) in top_docs {
            let doc: Document = searcher.doc(addr)?;
            if let Some(chunk) = self.to_chunk(&doc) {
                hits.push(chunk);
            }
        }
        debug!(hits = hits.len(), "keyword search");
        Ok(hits)
    }
}

/// Chunks of one document held in a Qdrant collection.
pub struct QdrantStore {
    client: QdrantClient,
    embedder: Arc<dyn EmbeddingProvider>,
    document: String,
}

fn point_id(chunk: &TextChunk, ordinal: usize) -> String {
    let hash = blake3::hash(
        format!(
            "{}\u{0}{}\u{0}{}\u{0}{}",
            chunk.source.document, chunk.source.page, ordinal, chunk.content
        )
        .as_bytes(),
    );
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    uuid::Uuid::from_bytes(bytes).to_string()
}

impl QdrantStore {
    pub fn new(client: QdrantClient, embedder: Arc<dyn EmbeddingProvider>, document: &str) -> Self {
        Self {
            client,
            embedder,
            document: document.to_string(),
        }
    }

    /// Replaces this document's points with `chunks`.
    pub async fn index(&self, chunks: &[TextChunk], batch_size: usize) -> anyhow::Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_batched(&self.embedder, &texts, batch_size).await?;
        let Some(dim) = vectors.first().map(Vec::len).filter(|d| *d > 0) else {
            anyhow::bail!("embedding provider returned empty vectors");
        };
        self.client
            .ensure_collection(dim)
            .await
            .context("qdrant collection setup")?;
        self.client
            .delete_by_filter(match_filter("document", &self.document))
            .await
            .context("qdrant delete previous points")?;

        const UPSERT_BATCH: usize = 256;
        let mut vectors = vectors.into_iter();
        let mut count = 0usize;
        for (batch_no, batch) in chunks.chunks(UPSERT_BATCH).enumerate() {
            let points: Vec<QdrantPoint> = batch
                .iter()
                .enumerate()
                .zip(vectors.by_ref())
                .map(|((i, chunk), vector)| {
                    let mut payload = HashMap::new();
                    payload.insert("document".to_string(), serde_json::json!(chunk.source.document));
                    payload.insert("page".to_string(), serde_json::json!(chunk.source.page));
                    payload.insert("content".to_string(), serde_json::json!(chunk.content));
                    QdrantPoint {
                        id: point_id(chunk, batch_no * UPSERT_BATCH + i),
                        vector,
                        payload,
                    }
                })
                .collect();
            count += points.len();
            self.client.upsert(points).await.context("qdrant upsert")?;
        }
        info!(document = %self.document, points = count, "indexed chunks in qdrant");
        Ok(count)
    }
}

#[async_trait::async_trait]
impl DocumentStore for QdrantStore {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<TextChunk>> {
        let vector = embed_batched(&self.embedder, &[query.to_string()], 1)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let resp = self
            .client
            .search(
                vector,
                k as u64,
                Some(match_filter("document", &self.document)),
            )
            .await?;
        Ok(resp
            .result
            .into_iter()
            .filter_map(|hit| {
                let payload = hit.payload?;
                let content = payload.get("content")?.as_str()?.to_string();
                let page = payload.get("page").and_then(|p| p.as_u64()).unwrap_or(0) as u32;
                Some(TextChunk::new(content, self.document.clone(), page))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::{EmbedResponse, ProviderError};

    fn chunks() -> Vec<TextChunk> {
        vec![
            TextChunk::new("Either party may terminate with thirty days notice.", "c.pdf", 1),
            TextChunk::new("Recipient shall keep all confidential information secret.", "c.pdf", 2),
            TextChunk::new("This agreement is governed by the laws of Delaware.", "c.pdf", 3),
        ]
    }

    #[tokio::test]
    async fn keyword_index_ranks_overlap_first() {
        let index = KeywordIndex::new(chunks()).unwrap();
        let hits = index
            .search("confidentiality clause protecting confidential information", 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source.page, 2);
    }

    #[tokio::test]
    async fn keyword_index_respects_k() {
        let index = KeywordIndex::new(chunks()).unwrap();
        let hits = index.search("terminate confidential governed", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(index.search("", 5).await.unwrap().is_empty());
        assert!(index.search("?? (", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keyword_index_matches_word_forms_of_rule_query() {
        let chunk = TextChunk::new(
            "Either party may terminate this Agreement upon thirty days written notification.",
            "msa.pdf",
            7,
        );
        let index = KeywordIndex::new(vec![chunk.clone()]).unwrap();
        let rule = crate::catalog::RuleCatalog::builtin()
            .get("termination_clause")
            .cloned()
            .unwrap();
        let hits = index
            .search(&crate::prompt::build_query(&rule), 5)
            .await
            .unwrap();
        assert_eq!(hits, vec![chunk]);
    }

    #[tokio::test]
    async fn empty_keyword_index_finds_nothing() {
        let index = KeywordIndex::new(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert!(index.search("termination", 5).await.unwrap().is_empty());
    }

    /// Embeds each text as counts of three marker words.
    struct MarkerEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for MarkerEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
            Ok(EmbedResponse {
                vectors: texts
                    .iter()
                    .map(|t| {
                        let t = t.to_lowercase();
                        ["terminat", "confidential", "governed"]
                            .iter()
                            .map(|m| t.matches(m).count() as f32)
                            .collect()
                    })
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn vector_index_orders_by_cosine() {
        let index = VectorIndex::build(Arc::new(MarkerEmbedder), chunks(), 2)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
        let hits = index.search("termination rights", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source.page, 1);
    }

    #[test]
    fn point_ids_are_stable_uuids() {
        let chunk = &chunks()[0];
        let a = point_id(chunk, 0);
        assert_eq!(a, point_id(chunk, 0));
        assert_ne!(a, point_id(chunk, 1));
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }
}
