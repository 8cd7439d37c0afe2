//! Per-paper content briefs
//!
//! Each paper gets a short structured brief generated from its full
//! text. Papers arriving without cached full content have it
//! reassembled from the document's chunks in position order. A failed
//! chat call degrades to a title-plus-abstract brief so a single bad
//! paper never sinks the whole survey.

use std::sync::Arc;
use surveyforge_common::db::models::Paper;
use surveyforge_common::llm::{ChatClient, ChatMessage, ChatParams};
use surveyforge_common::retrieval::Retriever;
use tracing::{error, warn};

/// Prompt content is bounded to this many chars
const CONTENT_CHARS: usize = 4000;

/// A paper brief paired with its title for synthesis
#[derive(Debug, Clone)]
pub struct PaperBrief {
    pub title: String,
    pub summary: String,
}

/// Reassemble a document's full text from its chunks, in position
/// order. Empty when the document has no chunks or the fetch fails.
pub async fn fetch_full_content(retriever: &Arc<dyn Retriever>, paper: &Paper) -> Option<String> {
    match retriever.document_chunks(paper.doc_id, &[paper.kb_id]).await {
        Ok(mut chunks) => {
            // Backend chunk order is not guaranteed
            chunks.sort_by_key(|c| c.position);
            let parts: Vec<&str> = chunks
                .iter()
                .map(|c| c.content.as_str())
                .filter(|c| !c.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        Err(e) => {
            warn!(doc_id = %paper.doc_id, error = %e, "Full content fetch failed");
            None
        }
    }
}

fn build_brief_prompt(title: &str, content: &str) -> String {
    let bounded: String = content.chars().take(CONTENT_CHARS).collect();
    format!(
        r#"Write a brief of roughly 200 words for the following academic paper:

Paper title: {title}

Paper content:
{bounded}

Structure the brief as follows, keeping it faithful to the source:
1. **Research topic**: the paper's core research topic
2. **Main methods**: the principal methods or techniques used
3. **Key results**: the main findings or experimental results
4. **Novelty**: the paper's important innovations or contributions
5. **Applicability**: the theoretical or practical significance
6. **Limitations**: shortcomings or open issues the paper leaves

Keep the brief accurate, detailed, and objective, highlighting the paper's core content and contributions."#
    )
}

/// Generate the brief for one paper. Uses cached full content when
/// present, the abstract otherwise. Never errors.
pub async fn generate_brief(chat: &Arc<dyn ChatClient>, paper: &Paper) -> PaperBrief {
    let content = paper
        .full_content
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(&paper.abstract_text);

    let messages = [ChatMessage::user(build_brief_prompt(&paper.title, content))];
    let params = ChatParams {
        temperature: 0.5,
        max_tokens: Some(1024),
    };

    let summary = match chat.complete(&messages, &params).await {
        Ok(text) => text,
        Err(e) => {
            error!(title = %paper.title, error = %e, "Brief generation failed, using abstract");
            format!("Title: {}\nAbstract: {}", paper.title, paper.abstract_text)
        }
    };

    PaperBrief {
        title: paper.title.clone(),
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surveyforge_common::llm::MockChatClient;
    use surveyforge_common::retrieval::{MockRetriever, RetrievalParams, RetrievedChunk};
    use surveyforge_common::Result;
    use uuid::Uuid;

    /// Returns chunks exactly as given, like a backend with no order
    /// guarantee.
    struct VerbatimRetriever {
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait::async_trait]
    impl Retriever for VerbatimRetriever {
        async fn retrieve(
            &self,
            _question: &str,
            _kb_ids: &[Uuid],
            _params: &RetrievalParams,
        ) -> Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }

        async fn document_chunks(
            &self,
            _doc_id: Uuid,
            _kb_ids: &[Uuid],
        ) -> Result<Vec<RetrievedChunk>> {
            Ok(self.chunks.clone())
        }
    }

    fn paper(full_content: Option<String>) -> Paper {
        Paper {
            uid: Uuid::new_v4(),
            title: "Sparse Attention at Scale".to_string(),
            abstract_text: "We study sparse attention.".to_string(),
            source: "kb".to_string(),
            similarity: 0.8,
            doc_id: Uuid::new_v4(),
            kb_id: Uuid::new_v4(),
            full_content,
            selected: Some(true),
        }
    }

    #[tokio::test]
    async fn test_brief_uses_model_response() {
        let chat: Arc<dyn ChatClient> =
            Arc::new(MockChatClient::new(vec!["a structured brief".to_string()]));
        let brief = generate_brief(&chat, &paper(Some("full text".to_string()))).await;
        assert_eq!(brief.summary, "a structured brief");
        assert_eq!(brief.title, "Sparse Attention at Scale");
    }

    #[tokio::test]
    async fn test_brief_falls_back_to_abstract_on_failure() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::new(vec![]));
        let brief = generate_brief(&chat, &paper(None)).await;
        assert!(brief.summary.contains("Sparse Attention at Scale"));
        assert!(brief.summary.contains("We study sparse attention."));
    }

    #[tokio::test]
    async fn test_fetch_full_content_sorts_unordered_backend_chunks() {
        let p = paper(None);
        let chunks = vec![
            RetrievedChunk {
                doc_id: p.doc_id,
                kb_id: p.kb_id,
                content: "second".to_string(),
                similarity: 0.5,
                position: 1,
            },
            RetrievedChunk {
                doc_id: p.doc_id,
                kb_id: p.kb_id,
                content: "first".to_string(),
                similarity: 0.5,
                position: 0,
            },
        ];
        let retriever: Arc<dyn Retriever> = Arc::new(VerbatimRetriever { chunks });

        let content = fetch_full_content(&retriever, &p).await;
        assert_eq!(content.as_deref(), Some("first\nsecond"));
    }

    #[tokio::test]
    async fn test_fetch_full_content_empty_document() {
        let retriever: Arc<dyn Retriever> = Arc::new(MockRetriever::empty());
        let content = fetch_full_content(&retriever, &paper(None)).await;
        assert!(content.is_none());
    }
}
