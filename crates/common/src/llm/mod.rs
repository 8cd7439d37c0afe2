//! Chat completion service abstraction
//!
//! Provides a unified interface for chat-completion providers:
//! - OpenAI-compatible APIs (chat/completions)
//! - Mock client for testing

use crate::errors::{AppError, Result};
use crate::metrics::record_completion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for a completion call
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

/// Trait for chat completion
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a chat completion and return the assistant text
    async fn complete(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat client
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiChatClient {
    /// Create a new OpenAI-compatible chat client
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_seconds: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries,
        })
    }

    /// Make request with retry
    async fn request_with_retry(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(messages, params).await {
                Ok(text) => {
                    record_completion(true);
                    return Ok(text);
                }
                Err(e) => {
                    record_completion(false);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Completion request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Completion {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Completion {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Completion {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatCompletionResponse =
            response.json().await.map_err(|e| AppError::Completion {
                message: format!("Failed to parse response: {}", e),
            })?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Completion {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        self.request_with_retry(messages, params).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock chat client for testing. Replies with canned responses in
/// order, then repeats the last one.
pub struct MockChatClient {
    responses: std::sync::Mutex<Vec<String>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockChatClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of completion calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, _messages: &[ChatMessage], _params: &ChatParams) -> Result<String> {
        let idx = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let responses = self.responses.lock().map_err(|_| AppError::Internal {
            message: "Mock response lock poisoned".to_string(),
        })?;
        responses
            .get(idx)
            .or_else(|| responses.last())
            .cloned()
            .ok_or_else(|| AppError::Completion {
                message: "Mock has no responses".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create a chat client based on configuration
pub fn create_chat_client(
    provider: &str,
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_seconds: u64,
    max_retries: u32,
) -> Result<Arc<dyn ChatClient>> {
    match provider {
        "openai" => {
            let key = api_key.ok_or_else(|| AppError::Configuration {
                message: "OpenAI API key required".to_string(),
            })?;
            Ok(Arc::new(OpenAiChatClient::new(
                key,
                model,
                base_url,
                timeout_seconds,
                max_retries,
            )?))
        }
        "mock" => Ok(Arc::new(MockChatClient::new(vec![String::new()]))),
        _ => {
            tracing::warn!(provider = provider, "Unknown chat provider, using mock");
            Ok(Arc::new(MockChatClient::new(vec![String::new()])))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{
        Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString,
        Unit,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct CounterHandle {
        name: String,
        counts: Arc<Mutex<HashMap<String, u64>>>,
    }

    impl CounterFn for CounterHandle {
        fn increment(&self, value: u64) {
            *self
                .counts
                .lock()
                .unwrap()
                .entry(self.name.clone())
                .or_insert(0) += value;
        }

        fn absolute(&self, value: u64) {
            self.counts.lock().unwrap().insert(self.name.clone(), value);
        }
    }

    /// Captures counter increments by metric name
    struct CountingRecorder {
        counts: Arc<Mutex<HashMap<String, u64>>>,
    }

    impl Recorder for CountingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            Counter::from_arc(Arc::new(CounterHandle {
                name: key.name().to_string(),
                counts: self.counts.clone(),
            }))
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[tokio::test]
    async fn test_failed_completion_increments_request_and_error_counters() {
        let counts = Arc::new(Mutex::new(HashMap::new()));
        let recorder = CountingRecorder {
            counts: counts.clone(),
        };
        let _guard = metrics::set_default_local_recorder(&recorder);

        // Nothing listens on port 1, so the single attempt fails fast
        let client = OpenAiChatClient::new(
            "test-key".to_string(),
            None,
            Some("http://127.0.0.1:1".to_string()),
            1,
            1,
        )
        .unwrap();

        let result = client
            .complete(&[ChatMessage::user("hi")], &ChatParams::default())
            .await;
        assert!(result.is_err());

        let counts = counts.lock().unwrap();
        assert_eq!(counts.get("surveyforge_completion_requests_total"), Some(&1));
        assert_eq!(counts.get("surveyforge_completion_errors_total"), Some(&1));
    }

    #[tokio::test]
    async fn test_mock_replies_in_order() {
        let client = MockChatClient::new(vec!["first".to_string(), "second".to_string()]);
        let params = ChatParams::default();

        let a = client.complete(&[ChatMessage::user("hi")], &params).await.unwrap();
        let b = client.complete(&[ChatMessage::user("hi")], &params).await.unwrap();
        let c = client.complete(&[ChatMessage::user("hi")], &params).await.unwrap();

        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(c, "second");
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::system("you are terse");
        assert_eq!(msg.role, "system");
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.role, "user");
    }
}
