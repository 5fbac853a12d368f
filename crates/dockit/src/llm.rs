//! Minimal client for OpenAI-compatible chat completions

use crate::error::SummarizationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default endpoint base
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for summaries and queries
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat completion client with retry and exponential backoff.
///
/// Retry strategy:
/// - HTTP 429 or 5xx: retry after `backoff << attempt`
/// - other HTTP 4xx: fail immediately
/// - network error: retry
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SummarizationError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SummarizationError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SummarizationError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_secs(1),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay before the first retry; doubles per attempt
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a conversation and return the first choice's text
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, SummarizationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: ChatResponse = response
                            .json()
                            .await
                            .map_err(|e| SummarizationError::InvalidResponse(e.to_string()))?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .map(|c| c.trim().to_string())
                            .ok_or_else(|| {
                                SummarizationError::InvalidResponse(
                                    "response has no message content".to_string(),
                                )
                            });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = SummarizationError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = status.as_u16(), attempt, "Chat completion failed, will retry");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Chat completion request failed");
                    last_err = Some(if e.is_timeout() {
                        SummarizationError::Timeout(self.timeout.as_secs())
                    } else {
                        SummarizationError::Network(e.to_string())
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            SummarizationError::Network("chat completion failed after retries".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        })
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            ChatClient::new(DEFAULT_BASE_URL, "  ", DEFAULT_MODEL),
            Err(SummarizationError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "m1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("  hello  ")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "sk-test", "m1").unwrap();
        let text = client
            .complete(&[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("ok")))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "sk-test", "m1")
            .unwrap()
            .with_backoff(Duration::ZERO);
        let text = client.complete(&[ChatMessage::user("hi")], 0.2).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "sk-test", "m1")
            .unwrap()
            .with_backoff(Duration::ZERO);
        let err = client
            .complete(&[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "sk-test", "m1")
            .unwrap()
            .with_max_retries(2)
            .with_backoff(Duration::ZERO);
        let err = client
            .complete(&[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::Api { status: 429, .. }));
    }
}
