use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use santai_core::config::{AppConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client for any OpenAI-compatible endpoint (OpenAI, Groq, Ollama).
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client =
            Client::builder().timeout(timeout).build().context("building llm http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_retries,
        })
    }

    /// Builds a client from configuration, or `None` when the provider is disabled.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        if config.llm.provider == LlmProvider::Disabled {
            return Ok(None);
        }
        let base_url = config
            .llm_base_url()
            .ok_or_else(|| anyhow!("no base url for llm provider {:?}", config.llm.provider))?;
        Self::new(
            base_url,
            config.llm.model.clone(),
            config.llm.api_key.clone(),
            Duration::from_secs(config.llm.timeout_secs),
            config.llm.max_retries,
        )
        .map(Some)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, Attempt> {
        let mut request = self.client.post(self.completions_url()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() || error.is_connect() {
                Attempt::Retryable(anyhow!(error).context("llm request failed"))
            } else {
                Attempt::Fatal(anyhow!(error).context("llm request failed"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Attempt::Retryable(anyhow!("llm endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(anyhow!("llm endpoint returned {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| Attempt::Fatal(anyhow!(error).context("decoding llm response")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Attempt::Fatal(anyhow!("llm response had no choices")))
    }
}

enum Attempt {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.2,
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(content) => return Ok(content),
                Err(Attempt::Retryable(error)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        event_name = "llm.retry",
                        attempt,
                        error = %error,
                        "retrying llm completion"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(Attempt::Retryable(error)) | Err(Attempt::Fatal(error)) => return Err(error),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: String,
}

/// Pulls the first JSON object out of a completion, tolerating code fences and prose.
pub fn extract_json_object(completion: &str) -> Result<Value> {
    let start = completion.find('{').ok_or_else(|| anyhow!("completion contains no object"))?;
    let end = completion.rfind('}').ok_or_else(|| anyhow!("completion contains no object"))?;
    if end < start {
        bail!("completion contains no object");
    }
    serde_json::from_str(&completion[start..=end]).context("completion object is not valid json")
}

/// Pulls the first JSON array out of a completion.
pub fn extract_json_array(completion: &str) -> Result<Value> {
    let start = completion.find('[').ok_or_else(|| anyhow!("completion contains no array"))?;
    let end = completion.rfind(']').ok_or_else(|| anyhow!("completion contains no array"))?;
    if end < start {
        bail!("completion contains no array");
    }
    serde_json::from_str(&completion[start..=end]).context("completion array is not valid json")
}
