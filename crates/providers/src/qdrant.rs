use crate::ProviderError;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct QdrantClient {
    client: Client,
    cfg: QdrantConfig,
}

impl QdrantClient {
    pub fn new(cfg: QdrantConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.cfg.url.trim_end_matches('/'),
            self.cfg.collection,
            suffix
        )
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let builder = match &self.cfg.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        };
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "status {} body {:?}",
                status, body
            )));
        }
        Ok(resp)
    }

    /// Creates the collection with cosine distance if it does not exist yet.
    pub async fn ensure_collection(&self, vector_size: usize) -> Result<(), ProviderError> {
        let exists = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        if exists {
            return Ok(());
        }
        let body = serde_json::json!({
            "vectors": { "size": vector_size, "distance": "Cosine" }
        });
        self.send(self.client.put(self.collection_url("")).json(&body))
            .await?;
        Ok(())
    }

    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<serde_json::Value>,
    ) -> Result<QdrantSearchResponse, ProviderError> {
        #[derive(Serialize)]
        struct SearchRequest {
            vector: Vec<f32>,
            limit: u64,
            with_payload: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            filter: Option<serde_json::Value>,
        }
        let body = SearchRequest {
            vector,
            limit,
            with_payload: true,
            filter,
        };
        let resp = self
            .send(
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&body),
            )
            .await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    pub async fn upsert(&self, points: Vec<QdrantPoint>) -> Result<(), ProviderError> {
        let req = QdrantUpsert { points };
        self.send(
            self.client
                .put(format!("{}?wait=true", self.collection_url("/points")))
                .json(&req),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_by_filter(&self, filter: serde_json::Value) -> Result<(), ProviderError> {
        #[derive(Serialize)]
        struct DeletePoints {
            filter: serde_json::Value,
        }
        let body = DeletePoints { filter };
        self.send(
            self.client
                .post(self.collection_url("/points/delete"))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

/// `must` filter matching a single keyword payload field.
pub fn match_filter(key: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "must": [{ "key": key, "match": { "value": value } }]
    })
}

#[derive(Debug, Serialize)]
pub struct QdrantUpsert {
    pub points: Vec<QdrantPoint>,
}

#[derive(Debug, Serialize)]
pub struct QdrantPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct QdrantSearchResponse {
    pub result: Vec<SearchResult>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchResult {
    pub id: serde_json::Value,
    pub score: f32,
    pub payload: Option<serde_json::Value>,
}
