use crate::config::JudgeConfig;
use crate::engine::Judge;
use crate::error::{Error, JudgeError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// External judgment via an OpenAI-compatible chat-completions endpoint.
pub struct ChatJudge {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl ChatJudge {
    pub fn new(config: &JudgeConfig, api_key: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    /// Reads the API key from the environment variable named in the config.
    pub fn from_env(config: &JudgeConfig) -> Result<Self, Error> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::StartupDependency(format!(
                    "judge API key not set (expected in ${})",
                    config.api_key_env
                ))
            })?;
        Self::new(config, api_key)
            .map_err(|e| Error::StartupDependency(format!("judge client: {e}")))
    }
}

pub fn build_prompt(domain: &str, evidence: &str) -> String {
    format!(
        "Domain: \"{domain}\"\n\
         Content: \"{evidence}\"\n\
         Task: Classify as SAFE or UNSAFE.\n\
         Rules:\n\
         - UNSAFE: Porn, Gambling, Malware, Phishing.\n\
         - SAFE: News, Blogs, Shops, Tech, Social.\n\
         Reply ONE word: SAFE or UNSAFE."
    )
}

#[async_trait::async_trait]
impl Judge for ChatJudge {
    async fn judge(&self, domain: &str, evidence: &str) -> Result<String, JudgeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(domain, evidence),
            }],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| JudgeError::Failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(JudgeError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(JudgeError::Failed(format!("status {}: {}", status.as_u16(), message)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Failed(e.to_string()))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
