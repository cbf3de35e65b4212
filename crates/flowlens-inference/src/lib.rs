#![warn(missing_docs)]
//! # flowlens-inference
//!
//! ## Purpose
//! Defines the boundary to the external vision model: one call that finds
//! automation opportunities in a snapshot and one that turns an opportunity
//! into a numbered guide.
//!
//! ## Responsibilities
//! - Expose the stateless [`InferenceGateway`] contract used by the session.
//! - Build requests (fixed instructions, schema, tag-stripped image payload).
//! - Parse and order responses, stamping guides with their suggestion id.
//! - Provide an HTTPS transport for hosted `generateContent` endpoints.
//!
//! ## Data flow
//! Snapshot -> [`GatewayClient`] builds an [`InferenceRequest`] ->
//! [`InferenceTransport::send`] returns model text -> [`parse_suggestions`] or
//! [`parse_guide`] -> session controller.
//!
//! ## Error model
//! Every failure is an [`InferenceError`]; callers treat all of them as
//! "operation failed". Analyze bodies that fail to parse are not errors: they
//! yield zero suggestions.
//!
//! ## Security and privacy notes
//! API keys travel in a request header and are never logged. Image payloads
//! are logged by size only.

mod contract;
mod http;
mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use flowlens_core::{Guide, ImageEncoding, Suggestion};
use serde_json::Value;
use thiserror::Error;

pub use contract::{parse_guide, parse_suggestions};
pub use http::{
    GenerateRequest, HttpTransport, HttpTransportConfig, build_generate_request, extract_text,
    generate_content_url,
};
pub use prompts::{
    ANALYSIS_INSTRUCTION, elaboration_instruction, guide_schema, suggestions_schema,
};

/// Stateless request/response contract with the external model.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Finds automation opportunities, ordered by descending relevance.
    ///
    /// # Errors
    /// Returns [`InferenceError`] when the call itself fails.
    async fn analyze(&self, image: &ImageEncoding) -> Result<Vec<Suggestion>, InferenceError>;

    /// Turns one suggestion into a guide stamped with `suggestion.id`.
    ///
    /// # Errors
    /// Returns [`InferenceError`] when the call fails or the response is not
    /// a valid guide.
    async fn elaborate(
        &self,
        suggestion: &Suggestion,
        image: &ImageEncoding,
    ) -> Result<Guide, InferenceError>;
}

/// Which gateway operation a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Opportunity discovery.
    Analyze,
    /// Guide generation.
    Elaborate,
}

/// Transport-neutral request handed to an [`InferenceTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Operation the request belongs to.
    pub kind: RequestKind,
    /// Instruction text.
    pub instruction: String,
    /// Base64 image payload with any data-URL tag removed.
    pub image_base64: String,
    /// Image mime type.
    pub mime_type: String,
    /// Expected response shape.
    pub response_schema: Value,
}

/// Abstract transport that delivers a request and returns the model's text.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    /// Returns [`InferenceError`] for network, status, or decoding failures.
    async fn send(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

/// [`InferenceGateway`] implementation over any [`InferenceTransport`].
#[derive(Clone)]
pub struct GatewayClient {
    transport: Arc<dyn InferenceTransport>,
}

impl GatewayClient {
    /// Creates a gateway client.
    pub fn new(transport: Arc<dyn InferenceTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl InferenceGateway for GatewayClient {
    async fn analyze(&self, image: &ImageEncoding) -> Result<Vec<Suggestion>, InferenceError> {
        let request = InferenceRequest {
            kind: RequestKind::Analyze,
            instruction: ANALYSIS_INSTRUCTION.to_string(),
            image_base64: image.payload().to_string(),
            mime_type: image.mime_type().to_string(),
            response_schema: suggestions_schema(),
        };

        let raw = self.transport.send(&request).await?;
        let suggestions = parse_suggestions(&raw);
        tracing::info!(count = suggestions.len(), "analysis returned suggestions");
        Ok(suggestions)
    }

    async fn elaborate(
        &self,
        suggestion: &Suggestion,
        image: &ImageEncoding,
    ) -> Result<Guide, InferenceError> {
        let request = InferenceRequest {
            kind: RequestKind::Elaborate,
            instruction: elaboration_instruction(suggestion),
            image_base64: image.payload().to_string(),
            mime_type: image.mime_type().to_string(),
            response_schema: guide_schema(),
        };

        let raw = self.transport.send(&request).await?;
        let guide = parse_guide(&raw, &suggestion.id)?;
        tracing::info!(
            suggestion_id = %suggestion.id,
            steps = guide.steps.len(),
            "elaboration returned guide"
        );
        Ok(guide)
    }
}

/// Inference boundary errors.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Network or client failure.
    #[error("inference transport failure: {0}")]
    Transport(String),
    /// Service answered with a non-success status.
    #[error("inference service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// Body could not be decoded.
    #[error("inference decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Body decoded but violates the response contract.
    #[error("inference contract violation: {0}")]
    InvalidContract(String),
    /// Service returned no content.
    #[error("inference response is empty")]
    EmptyResponse,
    /// Endpoint configuration is unusable.
    #[error("invalid inference endpoint: {0}")]
    InvalidEndpoint(String),
    /// No API key configured.
    #[error("inference api key is missing")]
    MissingApiKey,
}
