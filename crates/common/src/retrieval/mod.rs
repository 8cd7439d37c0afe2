//! Knowledge-base retrieval abstraction
//!
//! Provides a unified interface to the retrieval backend that ranks
//! chunks against a query across a set of knowledge bases, plus a mock
//! for testing.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A ranked chunk returned by the retrieval backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub doc_id: Uuid,
    pub kb_id: Uuid,
    pub content: String,
    pub similarity: f32,
    /// Position of the chunk within its document, used to reassemble
    /// full text in reading order
    pub position: i32,
}

/// Hybrid retrieval parameters
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalParams {
    pub page: u32,
    pub page_size: u32,
    /// Chunks scoring below this are dropped
    pub similarity_floor: f32,
    /// Weight of the vector score against the keyword score
    pub vector_weight: f32,
    pub top_k: u32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 30,
            similarity_floor: 0.2,
            vector_weight: 0.3,
            top_k: 1024,
        }
    }
}

/// Trait for chunk retrieval
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Rank chunks against a question across the given knowledge bases
    async fn retrieve(
        &self,
        question: &str,
        kb_ids: &[Uuid],
        params: &RetrievalParams,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Fetch every chunk of a single document, unranked
    async fn document_chunks(&self, doc_id: Uuid, kb_ids: &[Uuid]) -> Result<Vec<RetrievedChunk>>;
}

/// HTTP client for the retrieval backend
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    question: &'a str,
    kb_ids: &'a [Uuid],
    #[serde(flatten)]
    params: &'a RetrievalParams,
}

#[derive(Serialize)]
struct DocumentChunksRequest<'a> {
    doc_id: Uuid,
    kb_ids: &'a [Uuid],
}

#[derive(Deserialize)]
struct RetrieveResponse {
    chunks: Vec<RetrievedChunk>,
}

impl HttpRetriever {
    /// Create a new HTTP retriever
    pub fn new(base_url: String, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    async fn post_for_chunks<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<RetrievedChunk>> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Retrieval {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Retrieval {
                message: format!("API error {}: {}", status, text),
            });
        }

        let result: RetrieveResponse =
            response.json().await.map_err(|e| AppError::Retrieval {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(result.chunks)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        question: &str,
        kb_ids: &[Uuid],
        params: &RetrievalParams,
    ) -> Result<Vec<RetrievedChunk>> {
        if kb_ids.is_empty() {
            return Ok(Vec::new());
        }

        let request = RetrieveRequest {
            question,
            kb_ids,
            params,
        };
        self.post_for_chunks("/v1/retrieval", &request).await
    }

    async fn document_chunks(&self, doc_id: Uuid, kb_ids: &[Uuid]) -> Result<Vec<RetrievedChunk>> {
        let request = DocumentChunksRequest { doc_id, kb_ids };
        self.post_for_chunks("/v1/retrieval/chunks", &request).await
    }
}

/// Mock retriever for testing, backed by a fixed chunk set
pub struct MockRetriever {
    chunks: Vec<RetrievedChunk>,
}

impl MockRetriever {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self { chunks }
    }

    pub fn empty() -> Self {
        Self { chunks: Vec::new() }
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(
        &self,
        _question: &str,
        kb_ids: &[Uuid],
        params: &RetrievalParams,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut hits: Vec<RetrievedChunk> = self
            .chunks
            .iter()
            .filter(|c| kb_ids.contains(&c.kb_id) && c.similarity >= params.similarity_floor)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(params.page_size as usize);
        Ok(hits)
    }

    async fn document_chunks(&self, doc_id: Uuid, _kb_ids: &[Uuid]) -> Result<Vec<RetrievedChunk>> {
        let mut chunks: Vec<RetrievedChunk> = self
            .chunks
            .iter()
            .filter(|c| c.doc_id == doc_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.position);
        Ok(chunks)
    }
}

/// Create a retriever based on configuration
pub fn create_retriever(
    provider: &str,
    base_url: Option<String>,
    timeout_seconds: u64,
) -> Result<Arc<dyn Retriever>> {
    match provider {
        "http" => {
            let url = base_url.ok_or_else(|| AppError::Configuration {
                message: "Retrieval base URL required".to_string(),
            })?;
            Ok(Arc::new(HttpRetriever::new(url, timeout_seconds)?))
        }
        "mock" => Ok(Arc::new(MockRetriever::empty())),
        _ => {
            tracing::warn!(provider = provider, "Unknown retrieval provider, using mock");
            Ok(Arc::new(MockRetriever::empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kb: Uuid, doc: Uuid, sim: f32, position: i32) -> RetrievedChunk {
        RetrievedChunk {
            doc_id: doc,
            kb_id: kb,
            content: format!("chunk {}", position),
            similarity: sim,
            position,
        }
    }

    #[tokio::test]
    async fn test_mock_filters_by_kb_and_floor() {
        let kb_a = Uuid::new_v4();
        let kb_b = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let retriever = MockRetriever::new(vec![
            chunk(kb_a, doc, 0.9, 0),
            chunk(kb_a, doc, 0.1, 1),
            chunk(kb_b, doc, 0.8, 0),
        ]);

        let hits = retriever
            .retrieve("q", &[kb_a], &RetrievalParams::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 0.9);
    }

    #[tokio::test]
    async fn test_mock_document_chunks_in_position_order() {
        let kb = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let retriever = MockRetriever::new(vec![
            chunk(kb, doc, 0.5, 2),
            chunk(kb, doc, 0.5, 0),
            chunk(kb, doc, 0.5, 1),
        ]);

        let chunks = retriever.document_chunks(doc, &[kb]).await.unwrap();
        let positions: Vec<i32> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }
}
