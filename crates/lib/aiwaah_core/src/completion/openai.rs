// @zen-component: CHAT-OpenAIProvider
//
//! OpenAI completion provider.
//!
//! Calls the Responses API (`/v1/responses`) once per chat turn. Retries are
//! left to the caller.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ChatMessage, CompletionClient, CompletionError};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";

/// Connection settings for the OpenAI provider.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a [ChatMessage],
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Completion client for the OpenAI Responses API.
pub struct OpenAiClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, CompletionError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompletionError::Config("OPENAI_API_KEY is required".to_string()))?;
        let endpoint = Url::parse(&format!(
            "{}/responses",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| CompletionError::Config(format!("base url '{}': {e}", config.base_url)))?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        debug!(model = %self.model, messages = messages.len(), "requesting completion");
        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&ResponsesRequest {
                model: &self.model,
                input: messages,
            })
            .send()
            .await
            .map_err(|e| CompletionError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(status = status.as_u16(), body = %body, "completion request rejected");
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
            });
        }

        let reply: ResponsesReply = resp
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(format!("parse: {e}")))?;

        extract_text(reply)
            .ok_or_else(|| CompletionError::InvalidResponse("no output text".to_string()))
    }
}

/// Pull the reply text out of a Responses API payload.
fn extract_text(reply: ResponsesReply) -> Option<String> {
    if let Some(text) = reply.output_text.filter(|t| !t.is_empty()) {
        return Some(text);
    }
    let text: String = reply
        .output
        .into_iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content)
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text)
        .collect();
    (!text.is_empty()).then_some(text)
}
