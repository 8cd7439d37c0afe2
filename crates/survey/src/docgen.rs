//! Survey document rendering
//!
//! Turns stored survey content into a downloadable Markdown document:
//! `##N$$` citation tokens become `[N]` markers and a references
//! section lists the cited papers in ascending index order. Tokens
//! whose index falls outside the paper list are dropped with a warn
//! log rather than failing the download.

use regex_lite::Regex;
use std::collections::BTreeSet;
use surveyforge_common::db::models::Paper;
use tracing::warn;

const CITATION_PATTERN: &str = r"##(\d+)\$\$";

/// In-range citation indices found in the content, ascending
pub fn extract_citations(content: &str, paper_count: usize) -> BTreeSet<usize> {
    let re = match Regex::new(CITATION_PATTERN) {
        Ok(re) => re,
        Err(_) => return BTreeSet::new(),
    };

    let mut cited = BTreeSet::new();
    for captures in re.captures_iter(content) {
        let Some(m) = captures.get(1) else { continue };
        let Ok(idx) = m.as_str().parse::<usize>() else {
            continue;
        };
        if idx >= 1 && idx <= paper_count {
            cited.insert(idx);
        } else {
            warn!(index = idx, paper_count, "Citation index out of range, dropping");
        }
    }
    cited
}

/// Rewrite citation tokens as `[N]` markers, dropping out-of-range ones
fn rewrite_citations(content: &str, paper_count: usize) -> String {
    let re = match Regex::new(CITATION_PATTERN) {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    let mut out = String::with_capacity(content.len());
    let mut last_end = 0;
    for captures in re.captures_iter(content) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        out.push_str(&content[last_end..whole.start()]);

        let idx = captures
            .get(1)
            .and_then(|m| m.as_str().parse::<usize>().ok());
        match idx {
            Some(idx) if idx >= 1 && idx <= paper_count => {
                out.push_str(&format!("[{}]", idx));
            }
            _ => {}
        }
        last_end = whole.end();
    }
    out.push_str(&content[last_end..]);
    out
}

/// Render a survey as Markdown bytes with resolved citations and a
/// references section. No citation tokens means no references section.
pub fn render_survey(content: &str, title: &str, papers: &[Paper]) -> Vec<u8> {
    let cited = extract_citations(content, papers.len());
    let body = rewrite_citations(content, papers.len());

    let mut doc = String::new();
    doc.push_str(&format!("# {}\n\n", title));
    doc.push_str(&format!(
        "Generated: {}\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    ));
    doc.push_str(body.trim());
    doc.push('\n');

    if !cited.is_empty() {
        doc.push_str("\n---\n\n## References\n\n");
        for idx in &cited {
            // Indices are validated in-range by extract_citations
            if let Some(paper) = papers.get(idx - 1) {
                doc.push_str(&format!("{}. [{}] {}\n", idx, idx, paper.title));
            }
        }
    }

    doc.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn paper(title: &str) -> Paper {
        Paper {
            uid: Uuid::new_v4(),
            title: title.to_string(),
            abstract_text: String::new(),
            source: "kb".to_string(),
            similarity: 0.5,
            doc_id: Uuid::new_v4(),
            kb_id: Uuid::new_v4(),
            full_content: None,
            selected: Some(true),
        }
    }

    #[test]
    fn test_extract_citations_in_range_ascending() {
        let cited = extract_citations("see ##2$$ then ##1$$ and ##2$$ again", 3);
        assert_eq!(cited.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_extract_citations_drops_out_of_range() {
        let cited = extract_citations("##1$$ ##5$$ ##0$$", 2);
        assert_eq!(cited.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_rewrite_replaces_tokens_with_markers() {
        let out = rewrite_citations("score 85.3 ##1$$, per ##2$$.", 2);
        assert_eq!(out, "score 85.3 [1], per [2].");
    }

    #[test]
    fn test_rewrite_strips_out_of_range_tokens() {
        let out = rewrite_citations("valid ##1$$ invalid ##9$$ end", 1);
        assert_eq!(out, "valid [1] invalid  end");
    }

    #[test]
    fn test_render_includes_references_for_cited_papers() {
        let papers = vec![paper("Alpha"), paper("Beta"), paper("Gamma")];
        let bytes = render_survey("intro ##3$$ and ##1$$", "Survey", &papers);
        let doc = String::from_utf8(bytes).unwrap();

        assert!(doc.starts_with("# Survey\n"));
        assert!(doc.contains("intro [3] and [1]"));
        assert!(doc.contains("## References"));
        assert!(doc.contains("1. [1] Alpha"));
        assert!(doc.contains("3. [3] Gamma"));
        // Uncited paper is not listed
        assert!(!doc.contains("Beta"));
    }

    #[test]
    fn test_render_without_tokens_has_no_references() {
        let papers = vec![paper("Alpha")];
        let bytes = render_survey("plain prose only", "Survey", &papers);
        let doc = String::from_utf8(bytes).unwrap();
        assert!(!doc.contains("References"));
    }
}
