//! Gemini `generateContent` oracle.

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

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key_source: ApiKeySource,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Extracts the text of the first candidate.
fn parse_response(body: &str) -> Result<String, OracleError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::Other(format!("Failed to parse Gemini response: {}", e)))?;

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        OracleError::Other(format!(
            "No candidates in Gemini response (feedback: {})",
            response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_default()
        ))
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(OracleError::Other(format!(
            "Empty Gemini response (finish reason: {})",
            candidate.finish_reason.unwrap_or_default()
        )));
    }
    Ok(text.trim().to_string())
}

impl GeminiOracle {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key_source: ApiKeySource,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let model = model.into();
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.trim_start_matches("models/").to_string(),
            api_key_source,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl PatternOracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini"
    }

    fn classify(&self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: request.instruction,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &request.image.media_type,
                            data: general_purpose::STANDARD.encode(&request.image.bytes),
                        },
                    },
                ],
            }],
        };

        debug!(
            model = %self.model,
            image_bytes = request.image.bytes.len(),
            "Sending generateContent request"
        );

        let api_key = self.api_key_source.get_key()?;
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":" Geometric\n"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Geometric");
    }

    #[test]
    fn test_parse_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Polka"},{"text":" Dot"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Polka Dot");
    }

    #[test]
    fn test_parse_without_candidates() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, OracleError::Other(ref m) if m.contains("SAFETY")));
    }

    #[test]
    fn test_parse_empty_text() {
        let body = r#"{"candidates":[{"content":{"parts":[]},"finishReason":"MAX_TOKENS"}]}"#;
        assert!(matches!(parse_response(body), Err(OracleError::Other(_))));
    }

    #[test]
    fn test_request_shape() {
        let image = b"abc";
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "classify" },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: general_purpose::STANDARD.encode(image),
                        },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "classify");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "YWJj");
    }

    #[test]
    fn test_model_prefix_is_stripped() {
        let oracle = GeminiOracle::new(
            "https://example.test/v1beta/",
            "models/gemini-2.5-flash",
            ApiKeySource::Static("k".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            oracle.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
