//! Ollama chat client.
//!
//! One operation: `chat(system, user, temperature)` with a hard timeout.
//! Mock mode serves deterministic arithmetic items so the full pipeline can
//! run without a model; tests can also enqueue scripted responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;

#[derive(Debug, Clone)]
pub struct ChatOutput {
    pub text: String,
    pub model: String,
    pub full_prompt: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request timed out")]
    Timeout,
    #[error("llm network error: {0}")]
    Network(String),
    #[error("llm api error: status={status}, message={message}")]
    Api { status: u16, message: String },
    #[error("llm returned malformed JSON: {0}")]
    MalformedJson(String),
}

#[derive(Debug)]
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
    mock_counter: AtomicU64,
    mock_queue: Mutex<VecDeque<String>>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
            mock_counter: AtomicU64::new(0),
            mock_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.config.mock
    }

    /// Enqueue a canned response, served before the default mock output.
    pub fn push_mock_response(&self, text: impl Into<String>) {
        if let Ok(mut queue) = self.mock_queue.lock() {
            queue.push_back(text.into());
        }
    }

    pub async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> Result<ChatOutput, LlmError> {
        let full_prompt = format!("SYSTEM: {system_prompt}\n\nUSER: {user_prompt}");

        if self.config.mock {
            return Ok(ChatOutput {
                text: self.mock_text(),
                model: "mock".to_string(),
                full_prompt,
            });
        }

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "stream": false,
            "think": false,
            "keep_alive": "30m",
            "options": {
                "num_predict": self.config.max_tokens,
                "temperature": temperature,
            },
        });

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let text = parsed.message.map(|m| m.content).unwrap_or_default();
        let model = if parsed.model.is_empty() {
            self.config.model.clone()
        } else {
            parsed.model
        };

        tracing::info!(
            model = %model,
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "LLM chat completed"
        );

        Ok(ChatOutput {
            text,
            model,
            full_prompt,
        })
    }

    /// Scripted responses first; otherwise a fresh arithmetic item each call
    /// so mock sessions never trip the dedup layers.
    fn mock_text(&self) -> String {
        if let Ok(mut queue) = self.mock_queue.lock() {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }

        let n = self.mock_counter.fetch_add(1, Ordering::Relaxed) + 2;
        let (a, b) = (n, n + 3);
        json!({
            "question": format!("What is {a} + {b}?"),
            "correct_answer": format!("{}", a + b),
            "explanation": format!("{a} + {b} = {}", a + b),
            "estimated_difficulty": 0.3,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config() -> LlmConfig {
        LlmConfig {
            base_url: String::new(),
            model: "test".to_string(),
            mock: true,
            timeout_secs: 1,
            max_tokens: 128,
        }
    }

    #[tokio::test]
    async fn mock_mode_serves_varied_arithmetic() {
        let client = LlmClient::new(&mock_config());
        let first = client.chat("sys", "user", 0.7).await.unwrap();
        let second = client.chat("sys", "user", 0.7).await.unwrap();
        assert_ne!(first.text, second.text);
        assert_eq!(first.model, "mock");

        let parsed: serde_json::Value = serde_json::from_str(&first.text).unwrap();
        assert!(parsed["question"].as_str().unwrap().contains('+'));
    }

    #[tokio::test]
    async fn scripted_responses_take_priority() {
        let client = LlmClient::new(&mock_config());
        client.push_mock_response("{\"custom\": true}");
        let out = client.chat("sys", "user", 0.7).await.unwrap();
        assert_eq!(out.text, "{\"custom\": true}");
    }

    #[tokio::test]
    async fn full_prompt_records_both_parts() {
        let client = LlmClient::new(&mock_config());
        let out = client.chat("SYS-PART", "USER-PART", 0.7).await.unwrap();
        assert!(out.full_prompt.contains("SYS-PART"));
        assert!(out.full_prompt.contains("USER-PART"));
    }
}
