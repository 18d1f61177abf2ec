//! Anthropic `messages` oracle.

use super::error::OracleError;
use super::oracle::{
    classify_http_failure, classify_transport_failure, ApiKeySource, OracleRequest, PatternOracle,
};
use anyhow::Result;
use base64::{engine::general_purpose, Engine};
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const API_VERSION: &str = "2023-06-01";

/// The messages API rejects images whose base64 form exceeds this.
pub const MAX_ENCODED_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub struct AnthropicOracle {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key_source: ApiKeySource,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn parse_response(body: &str) -> Result<String, OracleError> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::Other(format!("Failed to parse Anthropic response: {}", e)))?;
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| OracleError::Other("No text block in Anthropic response".to_string()))
}

impl AnthropicOracle {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        api_key_source: ApiKeySource,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
            api_key_source,
        })
    }

    fn build_request<'a>(&'a self, request: &'a OracleRequest<'_>) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: &request.image.media_type,
                            data: general_purpose::STANDARD.encode(&request.image.bytes),
                        },
                    },
                    ContentBlock::Text {
                        text: request.instruction,
                    },
                ],
            }],
        }
    }
}

impl PatternOracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn classify(&self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        let body = self.build_request(request);
        debug!(
            model = %self.model,
            image_bytes = request.image.bytes.len(),
            "Sending messages request"
        );

        let api_key = self.api_key_source.get_key()?;
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| classify_transport_failure(&e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .map_err(|e| classify_transport_failure(&e))?;

        if !status.is_success() {
            return Err(classify_http_failure(
                status.as_u16(),
                retry_after.as_deref(),
                &text,
            ));
        }
        parse_response(&text)
    }
}
