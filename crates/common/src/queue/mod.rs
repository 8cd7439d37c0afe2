//! SQS queue integration for survey job dispatch
//!
//! Provides:
//! - Tiered SQS client wrapper (one queue per priority tier)
//! - Message serialization/deserialization
//! - Priority-ordered receive

use crate::db::models::Paper;
use crate::errors::{AppError, Result};
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Queue wiring for the survey pipeline
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Queue URLs, one per priority tier. Tier 0 is drained first.
    pub tier_urls: Vec<String>,
    /// Visibility timeout in seconds
    pub visibility_timeout: i32,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            tier_urls: Vec::new(),
            visibility_timeout: 600,
            wait_time_seconds: 20,
            max_messages: 1,
        }
    }
}

/// SQS queue client wrapper with priority tiers
pub struct SurveyQueue {
    client: SqsClient,
    config: TierConfig,
}

impl SurveyQueue {
    /// Create a new queue client
    pub async fn new(config: TierConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::with_client(SqsClient::new(&aws_config), config)
    }

    /// Create with an existing SQS client. At least one tier URL is
    /// required; `tier_url` relies on the list being non-empty.
    pub fn with_client(client: SqsClient, config: TierConfig) -> Result<Self> {
        if config.tier_urls.is_empty() {
            return Err(AppError::Configuration {
                message: "At least one queue tier URL is required".to_string(),
            });
        }

        Ok(Self { client, config })
    }

    /// Number of priority tiers
    pub fn tier_count(&self) -> usize {
        self.config.tier_urls.len()
    }

    fn tier_url(&self, priority: usize) -> &str {
        // Priorities beyond the configured tiers fold into the last one
        let idx = priority.min(self.config.tier_urls.len() - 1);
        &self.config.tier_urls[idx]
    }

    /// Send a message to the tier for the given priority
    pub async fn send<T: Serialize>(&self, message: &T, priority: usize) -> Result<String> {
        let body = serde_json::to_string(message).map_err(|e| AppError::Queue {
            message: format!("Failed to serialize message: {}", e),
        })?;

        let url = self.tier_url(priority);
        let result = self
            .client
            .send_message()
            .queue_url(url)
            .message_body(&body)
            .send()
            .await
            .map_err(|e| AppError::Queue {
                message: format!("Failed to send message: {}", e),
            })?;

        let message_id = result.message_id.unwrap_or_default();
        debug!(message_id = %message_id, priority, "Message sent to queue");

        Ok(message_id)
    }

    /// Receive messages, draining tiers in ascending order. Each tier
    /// is short-polled so a busy low tier always wins over a higher
    /// one; when every tier is empty a final long poll on tier 0 keeps
    /// the worker from spinning.
    pub async fn receive(&self) -> Result<Option<(usize, Vec<Message>)>> {
        for (tier, url) in self.config.tier_urls.iter().enumerate() {
            let messages = self.poll_tier(url, 0).await?;
            if !messages.is_empty() {
                debug!(tier, count = messages.len(), "Received messages from queue");
                return Ok(Some((tier, messages)));
            }
        }

        let messages = self
            .poll_tier(&self.config.tier_urls[0], self.config.wait_time_seconds)
            .await?;
        if !messages.is_empty() {
            debug!(tier = 0, count = messages.len(), "Received messages from queue");
            return Ok(Some((0, messages)));
        }

        Ok(None)
    }

    async fn poll_tier(&self, url: &str, wait_time_seconds: i32) -> Result<Vec<Message>> {
        let result = self
            .client
            .receive_message()
            .queue_url(url)
            .max_number_of_messages(self.config.max_messages)
            .visibility_timeout(self.config.visibility_timeout)
            .wait_time_seconds(wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::Queue {
                message: format!("Failed to receive messages: {}", e),
            })?;

        Ok(result.messages.unwrap_or_default())
    }

    /// Delete a message from its tier after processing
    pub async fn delete(&self, tier: usize, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(self.tier_url(tier))
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::Queue {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!(tier, "Message deleted from queue");
        Ok(())
    }

    /// Extend the visibility timeout of an in-flight message
    pub async fn extend_visibility(
        &self,
        tier: usize,
        receipt_handle: &str,
        additional_seconds: i32,
    ) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(self.tier_url(tier))
            .receipt_handle(receipt_handle)
            .visibility_timeout(additional_seconds)
            .send()
            .await
            .map_err(|e| AppError::Queue {
                message: format!("Failed to extend visibility: {}", e),
            })?;

        debug!(tier, additional_seconds, "Extended message visibility");
        Ok(())
    }

    /// Parse message body as JSON
    pub fn parse_message<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let body = message.body.as_ref().ok_or_else(|| AppError::Queue {
            message: "Message has no body".to_string(),
        })?;

        serde_json::from_str(body).map_err(|e| AppError::Queue {
            message: format!("Failed to parse message: {}", e),
        })
    }
}

/// Survey generation task message. Carries a full snapshot of the work
/// so the worker can run even if the search record is later mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyTaskMessage {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub papers: Vec<Paper>,
    pub priority: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paper() -> Paper {
        Paper {
            uid: Uuid::new_v4(),
            title: "Attention Is All You Need".to_string(),
            abstract_text: "We propose the Transformer.".to_string(),
            source: "arxiv".to_string(),
            similarity: 0.91,
            doc_id: Uuid::new_v4(),
            kb_id: Uuid::new_v4(),
            full_content: None,
            selected: Some(true),
        }
    }

    #[test]
    fn test_task_message_serialization() {
        let msg = SurveyTaskMessage {
            job_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Transformer Architectures".to_string(),
            papers: vec![sample_paper()],
            priority: 1,
            created_at: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: SurveyTaskMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(msg.job_id, parsed.job_id);
        assert_eq!(msg.papers.len(), parsed.papers.len());
        assert_eq!(msg.papers[0].title, parsed.papers[0].title);
    }

    #[test]
    fn test_tier_url_folds_overflow_priority() {
        let config = TierConfig {
            tier_urls: vec![
                "https://sqs.example/high".to_string(),
                "https://sqs.example/low".to_string(),
            ],
            ..TierConfig::default()
        };
        let aws_config = aws_sdk_sqs::Config::builder()
            .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest())
            .build();
        let queue = SurveyQueue::with_client(SqsClient::from_conf(aws_config), config).unwrap();

        assert_eq!(queue.tier_url(0), "https://sqs.example/high");
        assert_eq!(queue.tier_url(1), "https://sqs.example/low");
        assert_eq!(queue.tier_url(9), "https://sqs.example/low");
    }

    #[test]
    fn test_with_client_rejects_empty_tier_list() {
        let aws_config = aws_sdk_sqs::Config::builder()
            .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest())
            .build();
        let result =
            SurveyQueue::with_client(SqsClient::from_conf(aws_config), TierConfig::default());
        assert!(result.is_err());
    }
}
