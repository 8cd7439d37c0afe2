//! Paper search over accessible knowledge bases
//!
//! Retrieval scope is the tenant's own knowledge bases plus every
//! public one. Hits are deduped per document, keeping the
//! highest-ranked chunk, and joined against document metadata to
//! become papers. An empty scope or a retrieval failure yields an
//! empty paper list while the extracted keywords survive on the
//! search record.

use crate::keywords::{extract_keywords, KeywordBundle};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use surveyforge_common::db::models::Paper;
use surveyforge_common::llm::ChatClient;
use surveyforge_common::metrics::record_search;
use surveyforge_common::retrieval::{RetrievalParams, RetrievedChunk, Retriever};
use surveyforge_common::{Repository, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Length of the abstract excerpt taken from the top-ranked chunk
const ABSTRACT_CHARS: usize = 500;

/// Result of a paper search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub search_record_id: Uuid,
    pub papers: Vec<Paper>,
    pub keywords: KeywordBundle,
}

/// Keep the first (highest-ranked) chunk per document
pub fn dedupe_by_document(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|chunk| seen.insert(chunk.doc_id))
        .collect()
}

/// Extract keywords, retrieve, and persist both onto the search record
pub async fn search_papers(
    repo: &Repository,
    chat: &Arc<dyn ChatClient>,
    retriever: &Arc<dyn Retriever>,
    search_record_id: Uuid,
    query: &str,
    tenant_id: Uuid,
    keyword_count: usize,
    query_count: Option<usize>,
) -> Result<SearchOutcome> {
    let keywords = extract_keywords(chat, query, keyword_count, query_count).await;
    repo.update_search_keywords(search_record_id, serde_json::to_string(&keywords)?)
        .await?;

    let search_query = keywords.search_query();
    let papers = run_retrieval(repo, retriever, &search_query, tenant_id).await?;
    repo.update_search_results(search_record_id, &papers).await?;

    Ok(SearchOutcome {
        search_record_id,
        papers,
        keywords,
    })
}

/// Retrieve with a user-confirmed query, skipping extraction
pub async fn search_papers_with_keywords(
    repo: &Repository,
    retriever: &Arc<dyn Retriever>,
    search_record_id: Uuid,
    search_query: &str,
    tenant_id: Uuid,
) -> Result<Vec<Paper>> {
    let keywords_json = json!({ "user_confirmed_query": search_query }).to_string();
    repo.update_search_keywords(search_record_id, keywords_json)
        .await?;

    let papers = run_retrieval(repo, retriever, search_query, tenant_id).await?;
    repo.update_search_results(search_record_id, &papers).await?;

    Ok(papers)
}

async fn run_retrieval(
    repo: &Repository,
    retriever: &Arc<dyn Retriever>,
    search_query: &str,
    tenant_id: Uuid,
) -> Result<Vec<Paper>> {
    let started = Instant::now();

    let kbs = repo.accessible_knowledge_bases(tenant_id).await?;
    if kbs.is_empty() {
        warn!(%tenant_id, "No accessible knowledge bases, returning empty results");
        record_search(started.elapsed().as_secs_f64(), 0);
        return Ok(Vec::new());
    }
    let kb_ids: Vec<Uuid> = kbs.iter().map(|kb| kb.id).collect();

    let chunks = match retriever
        .retrieve(search_query, &kb_ids, &RetrievalParams::default())
        .await
    {
        Ok(chunks) => chunks,
        Err(e) => {
            // Keywords were already persisted; search degrades to empty
            error!(error = %e, "Retrieval failed, returning empty results");
            record_search(started.elapsed().as_secs_f64(), 0);
            return Ok(Vec::new());
        }
    };

    let mut papers = Vec::new();
    for chunk in dedupe_by_document(chunks) {
        let Some(doc) = repo.find_document_by_id(chunk.doc_id).await? else {
            // Stale index entry, drop the candidate
            warn!(doc_id = %chunk.doc_id, "Document metadata missing, dropping hit");
            continue;
        };

        let abstract_text: String = chunk.content.chars().take(ABSTRACT_CHARS).collect();
        papers.push(Paper {
            uid: doc.id,
            title: doc.name,
            abstract_text,
            source: doc.source.unwrap_or_else(|| "knowledge_base".to_string()),
            similarity: chunk.similarity,
            doc_id: chunk.doc_id,
            kb_id: chunk.kb_id,
            full_content: None,
            selected: Some(true),
        });
    }

    info!(count = papers.len(), "Paper search finished");
    record_search(started.elapsed().as_secs_f64(), papers.len());

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: Uuid, sim: f32) -> RetrievedChunk {
        RetrievedChunk {
            doc_id: doc,
            kb_id: Uuid::new_v4(),
            content: "content".to_string(),
            similarity: sim,
            position: 0,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_chunk_per_document() {
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let chunks = vec![chunk(doc_a, 0.9), chunk(doc_b, 0.8), chunk(doc_a, 0.7)];

        let deduped = dedupe_by_document(chunks);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].doc_id, doc_a);
        assert_eq!(deduped[0].similarity, 0.9);
        assert_eq!(deduped[1].doc_id, doc_b);
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_by_document(Vec::new()).is_empty());
    }
}
