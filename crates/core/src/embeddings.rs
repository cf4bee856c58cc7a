use anyhow::Context;
use providers::EmbeddingProvider;
use std::sync::Arc;
use tracing::debug;

/// Embeds `texts` in batches of `batch_size`, preserving input order.
pub async fn embed_batched(
    provider: &Arc<dyn EmbeddingProvider>,
    texts: &[String],
    batch_size: usize,
) -> anyhow::Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        let resp = provider
            .embed(batch)
            .await
            .with_context(|| format!("embedding batch {i} failed"))?;
        anyhow::ensure!(
            resp.vectors.len() == batch.len(),
            "embedding batch {i}: expected {} vectors, got {}",
            batch.len(),
            resp.vectors.len()
        );
        vectors.extend(resp.vectors);
    }
    debug!(count = vectors.len(), "embedded texts");
    Ok(vectors)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}
