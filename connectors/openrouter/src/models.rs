//! OpenRouter API data models

use larder_core::types::{ChatMessage, ModelInfo, ResponseFormatSpec, Usage};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenRouterRequestPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormatSpec>,
}

/// Successful (2xx) response as read off the wire, before shape checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Individual choice in the response
#[derive(Debug, Deserialize)]
pub struct WireChoice {
    #[serde(default)]
    pub index: u32,
    pub message: WireChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message in a choice
#[derive(Debug, Deserialize)]
pub struct WireChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Error response body `{"error": {"message", "code"}}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetails,
}

/// Error details
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetails {
    #[serde(default)]
    pub message: Option<String>,
    /// Numeric or string code depending on the provider behind the router
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// Body of `GET /models`
#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}
