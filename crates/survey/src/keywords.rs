//! Keyword extraction from a research question
//!
//! One chat call produces a bilingual keyword bundle as strict JSON.
//! Parsing is two-tier: a serde decode after stripping code fences,
//! then a field-by-field regex salvage for responses that wrap or
//! mangle the JSON. When the model call itself fails the question's
//! leading tokens stand in, so extraction never errors.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surveyforge_common::llm::{ChatClient, ChatMessage, ChatParams};
use surveyforge_common::metrics::record_keyword_fallback;
use surveyforge_common::DEFAULT_KEYWORD_COUNT;
use tracing::{error, warn};

/// Extracted keyword bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordBundle {
    #[serde(rename = "keyword_en", default)]
    pub keywords_en: Vec<String>,
    #[serde(rename = "keyword_cn", default)]
    pub keywords_cn: Vec<String>,
    #[serde(rename = "searchquery_en", default)]
    pub queries_en: Vec<String>,
    #[serde(rename = "searchquery_cn", default)]
    pub queries_cn: Vec<String>,
    #[serde(rename = "time_range", default)]
    pub time_range: Vec<String>,
}

impl KeywordBundle {
    /// Flatten keywords and search queries into one retrieval query
    pub fn search_query(&self) -> String {
        self.keywords_en
            .iter()
            .chain(self.keywords_cn.iter())
            .chain(self.queries_en.iter())
            .chain(self.queries_cn.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn clamp_count(count: usize) -> usize {
    if count > 1 && count <= 12 {
        count
    } else {
        DEFAULT_KEYWORD_COUNT
    }
}

fn build_prompt(keyword_count: usize, query_count: usize) -> String {
    format!(
        r#"Infer the research direction behind the user's input and output the {keyword_count} keywords closest to their needs. Output the keywords directly as a single JSON object with no extra commentary, in the format
  {{"keyword_en": [ English keywords ], "keyword_cn": [ corresponding Chinese keywords ], "searchquery_en": [ English search sentences ], "searchquery_cn": [ Chinese search sentences ], "time_range": ["2025", "2024", "2023"] }}.
Note the following:
1. Keywords must accurately reflect the topic of the user's input.
2. The output must strictly follow the specified JSON format.
3. The output must not contain any XML tags.
4. Time range detection: output an array of years according to the time requirement the user describes, defaulting to an empty array [].

Steps to complete the task:
- First, read and analyze the user's input to identify the core topic or research direction; keywords must stay within that field.
- Second, extract {keyword_count} closely related keywords for the identified topic, providing both English and Chinese versions.
- Then, based on the keywords and the user's intent, propose {query_count} search sentences usable for paper retrieval, again in both English and Chinese.
- Detect the time range:
  * "past three years" or "last three years" -> the three most recent years as strings
  * "past five years" or "last five years" -> the five most recent years
  * "after 2020" -> every year from 2021 to the current year
  * a specific year such as "2023" -> ["2023"]
  * a range such as "2022-2024" -> ["2022", "2023", "2024"]
  * no time cue -> []
- Finally, arrange the output in the specified JSON format, making sure it is well formed.

If the user's input is vague, make a reasonable guess based on common research areas."#
    )
}

/// Parse a model response into a keyword bundle. Strict JSON first,
/// regex salvage second.
pub fn parse_keyword_response(response: &str) -> KeywordBundle {
    let mut cleaned = response.trim().to_string();
    if let Some(stripped) = cleaned.strip_prefix("```json") {
        cleaned = stripped.to_string();
    }
    cleaned = cleaned.replace("```", "");

    match serde_json::from_str::<KeywordBundle>(&cleaned) {
        Ok(bundle) => bundle,
        Err(_) => {
            warn!(response = %cleaned, "Keyword JSON parse failed, salvaging fields");
            KeywordBundle {
                keywords_en: salvage_field(&cleaned, "keyword_en"),
                keywords_cn: salvage_field(&cleaned, "keyword_cn"),
                queries_en: salvage_field(&cleaned, "searchquery_en"),
                queries_cn: salvage_field(&cleaned, "searchquery_cn"),
                time_range: salvage_field(&cleaned, "time_range"),
            }
        }
    }
}

/// Extract the contents of one `"field": [...]` array, splitting on
/// commas and trimming quotes and whitespace
fn salvage_field(text: &str, field: &str) -> Vec<String> {
    let pattern = format!(r#""{}"\s*:\s*\[([^\]]+)\]"#, field);
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let Some(captures) = re.captures(text) else {
        return Vec::new();
    };
    let Some(inner) = captures.get(1) else {
        return Vec::new();
    };

    inner
        .as_str()
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Token fallback used when the model call fails entirely
fn fallback_bundle(question: &str, keyword_count: usize) -> KeywordBundle {
    let words: Vec<String> = question
        .split_whitespace()
        .take(keyword_count)
        .map(|w| w.to_string())
        .collect();

    KeywordBundle {
        keywords_en: words.clone(),
        keywords_cn: words,
        queries_en: vec![question.to_string()],
        queries_cn: vec![question.to_string()],
        time_range: Vec::new(),
    }
}

/// Extract keywords from a research question. Degrades to the token
/// fallback on any model failure, so this never returns an error.
pub async fn extract_keywords(
    chat: &Arc<dyn ChatClient>,
    question: &str,
    keyword_count: usize,
    query_count: Option<usize>,
) -> KeywordBundle {
    let keyword_count = clamp_count(keyword_count);
    let query_count = query_count.unwrap_or(keyword_count);

    let messages = [
        ChatMessage::system(build_prompt(keyword_count, query_count)),
        ChatMessage::user(question),
    ];
    let params = ChatParams {
        temperature: 0.6,
        max_tokens: Some(512),
    };

    match chat.complete(&messages, &params).await {
        Ok(response) => parse_keyword_response(&response),
        Err(e) => {
            error!(error = %e, "Keyword extraction failed, using token fallback");
            record_keyword_fallback();
            fallback_bundle(question, keyword_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surveyforge_common::llm::MockChatClient;

    #[test]
    fn test_parse_strict_json() {
        let response = r#"{"keyword_en": ["Deep Learning", "Diagnosis"], "keyword_cn": ["深度学习"], "searchquery_en": ["Deep learning for diagnosis"], "searchquery_cn": [], "time_range": ["2024", "2023"]}"#;
        let bundle = parse_keyword_response(response);
        assert_eq!(bundle.keywords_en, vec!["Deep Learning", "Diagnosis"]);
        assert_eq!(bundle.time_range, vec!["2024", "2023"]);
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let response = "```json\n{\"keyword_en\": [\"Robotics\"], \"keyword_cn\": [], \"searchquery_en\": [], \"searchquery_cn\": [], \"time_range\": []}\n```";
        let bundle = parse_keyword_response(response);
        assert_eq!(bundle.keywords_en, vec!["Robotics"]);
    }

    #[test]
    fn test_parse_salvages_broken_json() {
        // Trailing prose after the object defeats the strict parse
        let response = r#"Here you go: "keyword_en": ["Graph Neural Networks", "Molecules"], "time_range": ["2023"] hope that helps"#;
        let bundle = parse_keyword_response(response);
        assert_eq!(
            bundle.keywords_en,
            vec!["Graph Neural Networks", "Molecules"]
        );
        assert_eq!(bundle.time_range, vec!["2023"]);
        assert!(bundle.queries_en.is_empty());
    }

    #[test]
    fn test_parse_unsalvageable_yields_empty_bundle() {
        let bundle = parse_keyword_response("no structure at all");
        assert!(bundle.keywords_en.is_empty());
        assert!(bundle.search_query().is_empty());
    }

    #[test]
    fn test_count_clamp() {
        assert_eq!(clamp_count(0), 5);
        assert_eq!(clamp_count(1), 5);
        assert_eq!(clamp_count(2), 2);
        assert_eq!(clamp_count(12), 12);
        assert_eq!(clamp_count(13), 5);
    }

    #[test]
    fn test_search_query_flattens_all_fields() {
        let bundle = KeywordBundle {
            keywords_en: vec!["a".to_string()],
            keywords_cn: vec!["b".to_string()],
            queries_en: vec!["c d".to_string()],
            queries_cn: vec![],
            time_range: vec!["2024".to_string()],
        };
        assert_eq!(bundle.search_query(), "a b c d");
    }

    #[tokio::test]
    async fn test_extract_falls_back_on_model_failure() {
        // Mock with no responses errors on every call
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::new(vec![]));
        let bundle = extract_keywords(&chat, "graph neural networks for chemistry", 3, None).await;
        assert_eq!(bundle.keywords_en, vec!["graph", "neural", "networks"]);
        assert_eq!(
            bundle.queries_en,
            vec!["graph neural networks for chemistry"]
        );
        assert!(bundle.time_range.is_empty());
    }
}
