//! Survey synthesis from paper briefs
//!
//! Briefs are assigned 1-based citation indices in input order and the
//! model is instructed to mark every claim with a `##N$$` token. The
//! single synthesis call is the only one allowed to fail the job;
//! index validation is deferred to the renderer.

use crate::summary::PaperBrief;
use std::sync::Arc;
use surveyforge_common::llm::{ChatClient, ChatMessage, ChatParams};
use surveyforge_common::Result;
use tracing::info;

/// Each brief is bounded to this many chars inside the prompt
const BRIEF_CHARS: usize = 2000;

/// Build the synthesis prompt over the numbered briefs
pub fn build_synthesis_prompt(briefs: &[PaperBrief]) -> String {
    let count = briefs.len();

    let mut briefs_detail = String::new();
    for (i, brief) in briefs.iter().enumerate() {
        let bounded: String = brief.summary.chars().take(BRIEF_CHARS).collect();
        briefs_detail.push_str(&format!(
            "\nBrief {n}:\n- Title: {title}\n- Brief: {bounded}\n",
            n = i + 1,
            title = brief.title,
        ));
    }

    let index_map = briefs
        .iter()
        .enumerate()
        .map(|(i, brief)| format!("##{}$$ - {}", i + 1, brief.title))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"### Goal ###
Acting as a literature-review expert, write a structurally complete and substantive literature survey based on the following {count} paper briefs. Requirements:
1. Deeply analyze each brief's core ideas, technical innovations, and research lineage
2. Organize the content by technical evolution, application scenario, or research method
3. Mark the source of every specific technique or claim with a ##N$$ citation token
4. Maintain academic rigor, separating author claims from synthesized commentary

### Paper briefs ###
{briefs_detail}

### Content requirements ###
1. **Deep extraction**: pull out each paper's core methods, experimental results, and innovations, including key figures and performance numbers
2. **Cross-paper comparison**: contrast technical routes, trace the method timeline, and identify research trends

### Structure ###
Use an overview-body-conclusion structure containing:
1. **Research background** (merging the motivation and problem framing of all {count} papers)
2. **Analysis of core technical progress** (grouped by theme, comparing method innovations with concrete details and numbers)
3. **Challenges and limitations** (drawing on the problems each paper reports)
4. **Future directions** (synthesizing the papers' suggestions and outlook)

### Citation rules ###
1. **Density**: every technique, claim, or number must cite at least one specific paper
2. **Format**: use the ##N$$ token format, numbering from 1 in brief order, N in the range 1-{count}
3. **Coverage**: every brief's paper must be substantively analyzed in the survey

### Format constraints ###
- Use Markdown with a clear heading hierarchy
- **Strictly forbidden**: adding a reference list or References section
- **Strictly forbidden**: other citation formats such as [1] or (1)
- Every paragraph must be backed by citations

### Citation index mapping ###
Cite strictly according to this mapping:
{index_map}

### Citation style examples ###
Correct:
- "The proposed attention mechanism reached a BLEU score of 85.3 ##1$$, a 12.7 point improvement over prior methods."
- "Experiments in ##2$$ show 91.2% accuracy on visual question answering at roughly 30% extra inference cost."
Incorrect:
- "Multimodal AI is an important direction." (no citation)
- "Reference [1] states..." (wrong citation format)"#
    )
}

/// Run the single synthesis call
pub async fn synthesize(chat: &Arc<dyn ChatClient>, briefs: &[PaperBrief]) -> Result<String> {
    let prompt = build_synthesis_prompt(briefs);
    let messages = [ChatMessage::user(prompt)];
    let params = ChatParams {
        temperature: 0.7,
        max_tokens: Some(2048),
    };

    let content = chat.complete(&messages, &params).await?;
    info!(
        briefs = briefs.len(),
        content_len = content.len(),
        "Survey synthesis finished"
    );
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use surveyforge_common::llm::MockChatClient;

    fn briefs(n: usize) -> Vec<PaperBrief> {
        (0..n)
            .map(|i| PaperBrief {
                title: format!("Paper {}", i + 1),
                summary: format!("Brief {}", i + 1),
            })
            .collect()
    }

    #[test]
    fn test_prompt_numbers_briefs_in_input_order() {
        let prompt = build_synthesis_prompt(&briefs(3));
        assert!(prompt.contains("##1$$ - Paper 1"));
        assert!(prompt.contains("##2$$ - Paper 2"));
        assert!(prompt.contains("##3$$ - Paper 3"));
        assert!(prompt.contains("1-3"));
    }

    #[test]
    fn test_prompt_bounds_brief_length() {
        let long = PaperBrief {
            title: "Long".to_string(),
            summary: "x".repeat(5000),
        };
        let prompt = build_synthesis_prompt(&[long]);
        // 2000 chars of brief appear, the rest is cut
        assert!(prompt.contains(&"x".repeat(2000)));
        assert!(!prompt.contains(&"x".repeat(2001)));
    }

    #[tokio::test]
    async fn test_synthesize_propagates_model_failure() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::new(vec![]));
        let result = synthesize(&chat, &briefs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_synthesize_returns_content() {
        let chat: Arc<dyn ChatClient> =
            Arc::new(MockChatClient::new(vec!["survey ##1$$".to_string()]));
        let content = synthesize(&chat, &briefs(1)).await.unwrap();
        assert_eq!(content, "survey ##1$$");
    }
}
