//! HTTPS transport speaking the `generateContent` JSON protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{InferenceError, InferenceRequest, InferenceTransport};

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// API base URL, for example `https://generativelanguage.googleapis.com/v1beta`.
    pub endpoint: String,
    /// Model identifier appended to the request path.
    pub model: String,
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Transport that posts requests to a hosted vision model.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl HttpTransport {
    /// Creates a validated transport.
    ///
    /// # Errors
    /// Returns [`InferenceError::InvalidEndpoint`] for non-HTTPS endpoints,
    /// [`InferenceError::MissingApiKey`] for a blank key, and
    /// [`InferenceError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, InferenceError> {
        if config.api_key.trim().is_empty() {
            return Err(InferenceError::MissingApiKey);
        }

        let url = generate_content_url(&config.endpoint, &config.model)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| InferenceError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key,
        })
    }

    /// Returns the request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn send(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let body = build_generate_request(request);
        tracing::debug!(
            kind = ?request.kind,
            image_bytes = request.image_base64.len(),
            "sending inference request"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| InferenceError::Transport(error.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| InferenceError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: truncate(&text, 512),
            });
        }

        extract_text(&text)
    }
}

/// Builds the request URL from a base endpoint and model name.
///
/// # Errors
/// Returns [`InferenceError::InvalidEndpoint`] for unparsable or non-HTTPS URLs.
pub fn generate_content_url(endpoint: &str, model: &str) -> Result<Url, InferenceError> {
    let base = Url::parse(endpoint)
        .map_err(|error| InferenceError::InvalidEndpoint(format!("invalid url: {error}")))?;

    if base.scheme() != "https" {
        return Err(InferenceError::InvalidEndpoint(
            "inference endpoint must use https".to_string(),
        ));
    }
    if model.trim().is_empty() {
        return Err(InferenceError::InvalidEndpoint("model name is empty".to_string()));
    }

    let path = format!(
        "{}/models/{}:generateContent",
        base.path().trim_end_matches('/'),
        model.trim()
    );
    let mut url = base;
    url.set_path(&path);
    Ok(url)
}

/// Serializes one request into the wire body.
pub fn build_generate_request(request: &InferenceRequest) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: request.instruction.clone(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: request.mime_type.clone(),
                        data: request.image_base64.clone(),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: request.response_schema.clone(),
        },
    }
}

/// Extracts the model text from a wire response body.
///
/// # Errors
/// Returns [`InferenceError::Decode`] for malformed bodies and
/// [`InferenceError::EmptyResponse`] when no candidate carries text.
pub fn extract_text(body: &str) -> Result<String, InferenceError> {
    let parsed: GenerateResponse = serde_json::from_str(body).map_err(InferenceError::Decode)?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(InferenceError::EmptyResponse);
    }
    Ok(text)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Wire request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Clone, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    //! Unit tests for URL building and wire-body handling.

    use super::*;
    use crate::RequestKind;

    #[test]
    fn builds_model_path_under_base() {
        let url = generate_content_url("https://example.test/v1beta/", "vision-1")
            .expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://example.test/v1beta/models/vision-1:generateContent"
        );
    }

    #[test]
    fn rejects_plain_http() {
        assert!(matches!(
            generate_content_url("http://example.test/v1beta", "vision-1"),
            Err(InferenceError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn request_body_carries_image_without_tag() {
        let request = InferenceRequest {
            kind: RequestKind::Analyze,
            instruction: "find workflows".to_string(),
            image_base64: "AAAA".to_string(),
            mime_type: "image/png".to_string(),
            response_schema: serde_json::json!({ "type": "ARRAY" }),
        };

        let body = serde_json::to_value(build_generate_request(&request))
            .expect("body should serialize");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "find workflows");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["data"], "AAAA");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn extracts_concatenated_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"[{"},{"text":"}]"}]}}]}"#;
        assert_eq!(extract_text(body).expect("text should extract"), "[{}]");
    }

    #[test]
    fn missing_candidates_are_empty() {
        assert!(matches!(
            extract_text(r#"{"candidates":[]}"#),
            Err(InferenceError::EmptyResponse)
        ));
    }
}
