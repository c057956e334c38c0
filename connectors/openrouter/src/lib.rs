//! OpenRouter connector for Larder chat completions

use async_trait::async_trait;
use larder_core::prelude::*;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error, info, warn};

mod config;
mod models;
mod retry;

pub use config::{OpenRouterConfig, DEFAULT_BASE_URL};
pub use models::{OpenRouterRequestPayload, RawResponse};
pub use retry::{RetryDecision, RetryPolicy};
use models::*;

/// OpenRouter implementation of ChatCompletionClient.
///
/// Holds only read-only configuration and a pooled HTTP client, so one
/// instance can be shared across concurrent callers.
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
    retry: RetryPolicy,
}

impl OpenRouterClient {
    /// Create a new OpenRouter client
    pub fn new(config: OpenRouterConfig) -> Result<Self, ClassifiedError> {
        if config.api_key.trim().is_empty() {
            return Err(ClassifiedError::configuration("OpenRouter API key is not set"));
        }
        if config.api_base().trim().is_empty() {
            return Err(ClassifiedError::configuration("OpenRouter base URL is empty"));
        }

        let client = Client::builder().build().map_err(|e| {
            ClassifiedError::configuration(format!("Failed to create HTTP client: {}", e))
        })?;
        let retry = RetryPolicy::from_config(&config);

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Create a client from an API key and an optional base URL override
    pub fn with_api_key(
        api_key: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, ClassifiedError> {
        let mut config = OpenRouterConfig::new(api_key);
        if let Some(base_url) = base_url {
            config = config.with_base_url(base_url);
        }
        Self::new(config)
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    /// Check that a conversation can be sent as a completion request
    pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), ClassifiedError> {
        if messages.is_empty() {
            return Err(ClassifiedError::validation("Messages must not be empty"));
        }

        for (index, message) in messages.iter().enumerate() {
            let role: Role = message.role.parse().map_err(|_| {
                ClassifiedError::validation(format!(
                    "Message {} has invalid role '{}'; expected system, user or assistant",
                    index, message.role
                ))
            })?;

            if message.content.trim().is_empty() {
                return Err(ClassifiedError::validation(format!(
                    "Message {} has empty content",
                    index
                )));
            }

            if role == Role::System && index != 0 {
                return Err(ClassifiedError::validation(
                    "A system message is only allowed as the first message",
                ));
            }
        }

        match messages.last() {
            Some(last) if last.role == Role::User.as_str() => Ok(()),
            _ => Err(ClassifiedError::validation(
                "The last message must have the user role",
            )),
        }
    }

    /// Turn a request into the wire payload
    pub fn build_request_payload(
        request: &ChatCompletionRequest,
    ) -> Result<OpenRouterRequestPayload, ClassifiedError> {
        if request.model.trim().is_empty() {
            return Err(ClassifiedError::validation("Model must be specified"));
        }

        Ok(OpenRouterRequestPayload {
            model: request.model.clone(),
            messages: request.messages.clone(),
            temperature: request.temperature.unwrap_or(1.0),
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            response_format: request.response_format.clone(),
        })
    }

    /// Classify a non-2xx upstream response.
    ///
    /// | status | code             | retried |
    /// |--------|------------------|---------|
    /// | 401    | UNAUTHORIZED     | no      |
    /// | 400    | VALIDATION_ERROR | no      |
    /// | 402    | INTERNAL_ERROR   | no      |
    /// | 429    | INTERNAL_ERROR   | yes     |
    /// | >= 500 | INTERNAL_ERROR   | yes     |
    /// | other  | INTERNAL_ERROR   | no      |
    pub fn handle_api_error(status: u16, body: &str) -> ClassifiedError {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let body_message = parsed
            .as_ref()
            .and_then(|value| serde_json::from_value::<ApiErrorBody>(value.clone()).ok())
            .and_then(|body| body.error.message)
            .filter(|message| !message.trim().is_empty());

        let error = match status {
            401 => ClassifiedError::new(
                ErrorCode::Unauthorized,
                "Invalid or missing OpenRouter API key",
                status,
            ),
            400 => ClassifiedError::new(
                ErrorCode::ValidationError,
                body_message.unwrap_or_else(|| "Invalid request to the model API".to_string()),
                status,
            ),
            402 => ClassifiedError::new(
                ErrorCode::InternalError,
                "Insufficient funds in the OpenRouter account",
                status,
            ),
            429 => ClassifiedError::new(
                ErrorCode::InternalError,
                "Rate limit exceeded on the model API, please try again later",
                status,
            )
            .into_transient(),
            500..=599 => ClassifiedError::new(
                ErrorCode::InternalError,
                format!("Model API server error ({})", status),
                status,
            )
            .into_transient(),
            _ => ClassifiedError::new(
                ErrorCode::InternalError,
                body_message.unwrap_or_else(|| {
                    format!("Model API request failed with status {}", status)
                }),
                status,
            ),
        };

        match parsed {
            Some(details) => error.with_details(details),
            None => error,
        }
    }

    /// Send a payload to the chat completions endpoint, retrying transient failures
    pub async fn send_request(
        &self,
        payload: &OpenRouterRequestPayload,
    ) -> Result<RawResponse, ClassifiedError> {
        self.execute(Method::POST, "/chat/completions", Some(payload)).await
    }

    /// Check the response shape and decode structured content
    pub fn parse_response(
        &self,
        response: RawResponse,
        original_request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ClassifiedError> {
        if !response.is_success() {
            return Err(Self::handle_api_error(response.status, &response.body));
        }

        let wire: WireResponse = serde_json::from_str(&response.body).map_err(|e| {
            error!("Failed to parse chat completion response: {}", e);
            malformed_response(format!("response body is not valid JSON: {}", e))
        })?;

        if wire.id.is_empty() || wire.choices.is_empty() {
            return Err(malformed_response("response is missing id or choices"));
        }

        let schema = original_request
            .response_format
            .as_ref()
            .map(ResponseFormatSpec::schema_spec);

        let choices = wire
            .choices
            .into_iter()
            .map(|choice| {
                let text = choice.message.content.unwrap_or_default();
                let content = match schema {
                    Some(spec) => MessageContent::Json(decode_structured(&text, spec)?),
                    None => MessageContent::Text(text),
                };
                Ok(Choice {
                    index: choice.index,
                    message: ChoiceMessage {
                        role: choice
                            .message
                            .role
                            .unwrap_or_else(|| Role::Assistant.as_str().to_string()),
                        content,
                    },
                    finish_reason: choice.finish_reason.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, ClassifiedError>>()?;

        Ok(ChatCompletionResponse {
            id: wire.id,
            model: wire.model,
            created: wire.created,
            choices,
            usage: wire.usage,
        })
    }

    /// Run a request with the retry policy
    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<&OpenRouterRequestPayload>,
    ) -> Result<RawResponse, ClassifiedError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.attempt(method.clone(), path, payload).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match self.retry.decide(&error, attempt) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        "{} {} failed on attempt {}/{} ({}), retrying in {}ms",
                        method,
                        path,
                        attempt,
                        self.retry.max_attempts(),
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    if error.is_transient() {
                        error!(
                            "{} {} failed after {} attempt(s): {}",
                            method, path, attempt, error
                        );
                    }
                    return Err(error);
                }
            }
        }
    }

    /// A single HTTP exchange bounded by the per-attempt timeout
    async fn attempt(
        &self,
        method: Method,
        path: &str,
        payload: Option<&OpenRouterRequestPayload>,
    ) -> Result<RawResponse, ClassifiedError> {
        let mut builder = self
            .client
            .request(method, self.config.api_url(path))
            .bearer_auth(&self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.config.timeout());

        if let Some(ref app_url) = self.config.app_url {
            builder = builder.header("HTTP-Referer", app_url);
        }
        if let Some(ref app_title) = self.config.app_title {
            builder = builder.header("X-Title", app_title);
        }
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !(200..300).contains(&status) {
            return Err(Self::handle_api_error(status, &body));
        }

        Ok(RawResponse { status, body })
    }

    fn transport_error(&self, e: reqwest::Error) -> ClassifiedError {
        if e.is_timeout() {
            ClassifiedError::timeout(self.config.timeout_ms)
        } else {
            ClassifiedError::network(e.without_url().to_string())
        }
    }
}

fn malformed_response(reason: impl Into<String>) -> ClassifiedError {
    ClassifiedError::new(
        ErrorCode::InternalError,
        format!("Malformed response from model API: {}", reason.into()),
        502,
    )
}

/// Decode schema-constrained content and check it against the declared schema
fn decode_structured(
    content: &str,
    spec: &JsonSchemaSpec,
) -> Result<serde_json::Value, ClassifiedError> {
    // Clean up potential markdown code block fences
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| {
        error!("Structured output for schema '{}' is not valid JSON: {}", spec.name, e);
        invalid_structured_output(&spec.name, format!("content is not valid JSON: {}", e))
    })?;

    check_shape(&value, &spec.schema)
        .map_err(|reason| invalid_structured_output(&spec.name, reason))?;

    debug!("Structured output validated against schema '{}'", spec.name);
    Ok(value)
}

fn invalid_structured_output(schema_name: &str, reason: String) -> ClassifiedError {
    ClassifiedError::internal(format!("Invalid {} format: {}", schema_name, reason))
        .with_details(json!({ "schema": schema_name, "reason": reason }))
}

/// Minimal structural check: top-level type and required properties with their declared types
fn check_shape(value: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        if !matches_type(value, expected) {
            return Err(format!("expected a JSON {}", expected));
        }
    }

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|k| k.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for key in required {
        let field = value
            .get(key)
            .ok_or_else(|| format!("missing required field '{}'", key))?;

        let declared = schema
            .get("properties")
            .and_then(|p| p.get(key))
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str());
        if let Some(expected) = declared {
            if !matches_type(field, expected) {
                return Err(format!("field '{}' should be of type {}", key, expected));
            }
        }
    }

    Ok(())
}

fn matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[async_trait]
impl ChatCompletionClient for OpenRouterClient {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ClassifiedError> {
        Self::validate_messages(&request.messages)?;
        let payload = Self::build_request_payload(&request)?;

        debug!(
            "Starting chat completion with model {} ({} messages)",
            payload.model,
            payload.messages.len()
        );
        let start_time = Instant::now();

        let raw = self.send_request(&payload).await?;
        let response = self.parse_response(raw, &request)?;

        info!(
            "Chat completion {} finished in {}ms ({} total tokens)",
            response.id,
            start_time.elapsed().as_millis(),
            response.usage.map(|u| u.total_tokens).unwrap_or(0)
        );

        Ok(response)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ClassifiedError> {
        debug!("Listing upstream models");
        let raw = self.execute(Method::GET, "/models", None).await?;

        let models: ModelsResponse = serde_json::from_str(&raw.body).map_err(|e| {
            error!("Failed to parse model catalog: {}", e);
            malformed_response(format!("model catalog is not valid: {}", e))
        })?;

        info!("Upstream offers {} models", models.data.len());
        Ok(models.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> OpenRouterConfig {
        OpenRouterConfig::new("test-key")
            .with_base_url(server.uri())
            .with_timeout(2_000)
            .with_retry_delay(10, 50)
    }

    fn test_client(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new(test_config(server)).unwrap()
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "gen-123",
            "model": "openai/gpt-4o-mini",
            "created": 1_700_000_000,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        })
    }

    fn user_request() -> ChatCompletionRequest {
        ChatCompletionRequest::new("openai/gpt-4o-mini", vec![ChatMessage::user("Hello")])
    }

    fn payload() -> OpenRouterRequestPayload {
        OpenRouterClient::build_request_payload(&user_request()).unwrap()
    }

    fn recipe_format() -> ResponseFormatSpec {
        ResponseFormatSpec::json_schema(
            "recipe",
            false,
            json!({
                "type": "object",
                "properties": {"title": {"type": "string"}, "ingredients": {"type": "array"}},
                "required": ["title"]
            }),
        )
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map(|r| r.len()).unwrap_or(0)
    }

    #[test]
    fn test_client_requires_api_key() {
        let err = OpenRouterClient::new(OpenRouterConfig::new("")).err().unwrap();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("API key"));

        assert!(OpenRouterClient::new(OpenRouterConfig::new("   \t")).is_err());
        assert!(OpenRouterClient::with_api_key("key", None).is_ok());
    }

    #[test]
    fn test_base_url_override() {
        let client = OpenRouterClient::with_api_key("key", Some("http://localhost:9999/v1/")).unwrap();
        assert_eq!(
            client.config().api_url("/chat/completions"),
            "http://localhost:9999/v1/chat/completions"
        );

        let client = OpenRouterClient::with_api_key("key", None).unwrap();
        assert_eq!(client.config().base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_validate_messages_rejects_empty() {
        let err = OpenRouterClient::validate_messages(&[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_validate_messages_requires_user_last() {
        for last in [ChatMessage::assistant("ok"), ChatMessage::system("rules")] {
            let messages = vec![ChatMessage::user("hi"), last];
            let err = OpenRouterClient::validate_messages(&messages).unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationError);
        }

        let err = OpenRouterClient::validate_messages(&[ChatMessage::assistant("a")]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_messages_system_position() {
        let ok = vec![ChatMessage::system("a"), ChatMessage::user("b")];
        assert!(OpenRouterClient::validate_messages(&ok).is_ok());

        let misplaced = vec![ChatMessage::user("a"), ChatMessage::system("b")];
        assert!(OpenRouterClient::validate_messages(&misplaced).is_err());

        let middle = vec![
            ChatMessage::user("a"),
            ChatMessage::system("b"),
            ChatMessage::user("c"),
        ];
        let err = OpenRouterClient::validate_messages(&middle).unwrap_err();
        assert!(err.message.contains("first message"));
    }

    #[test]
    fn test_validate_messages_role_and_content() {
        let unknown = vec![ChatMessage {
            role: "tool".to_string(),
            content: "x".to_string(),
        }];
        let err = OpenRouterClient::validate_messages(&unknown).unwrap_err();
        assert!(err.message.contains("invalid role 'tool'"));

        let empty = vec![ChatMessage::user("")];
        assert!(OpenRouterClient::validate_messages(&empty).is_err());

        let conversation = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("Give me a recipe"),
        ];
        assert!(OpenRouterClient::validate_messages(&conversation).is_ok());
    }

    #[test]
    fn test_payload_defaults_temperature() {
        let payload = payload();
        assert_eq!(payload.temperature, 1.0);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["temperature"], json!(1.0));
        assert!(value.get("max_tokens").is_none());
        assert!(value.get("top_p").is_none());
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_payload_copies_optional_fields() {
        let request = user_request()
            .with_temperature(0.5)
            .with_max_tokens(256)
            .with_top_p(0.9)
            .with_response_format(recipe_format());

        let value = serde_json::to_value(OpenRouterClient::build_request_payload(&request).unwrap()).unwrap();
        assert_eq!(value["temperature"], json!(0.5));
        assert_eq!(value["max_tokens"], json!(256));
        assert_eq!(value["top_p"], json!(0.9f32));
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "recipe");
    }

    #[test]
    fn test_payload_requires_model() {
        let request = ChatCompletionRequest::new("", vec![ChatMessage::user("hi")]);
        let err = OpenRouterClient::build_request_payload(&request).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_handle_api_error_table() {
        let err = OpenRouterClient::handle_api_error(401, r#"{"error":{"message":"No auth"}}"#);
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.status_code, 401);
        assert!(!err.is_transient());

        let err = OpenRouterClient::handle_api_error(400, r#"{"error":{"message":"model is required","code":400}}"#);
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.message, "model is required");
        assert_eq!(err.details.as_ref().unwrap()["error"]["code"], 400);

        let err = OpenRouterClient::handle_api_error(402, "");
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("Insufficient funds"));
        assert!(!err.is_transient());

        let err = OpenRouterClient::handle_api_error(429, "");
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("Rate limit"));
        assert!(err.is_transient());

        let err = OpenRouterClient::handle_api_error(503, "upstream down");
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.status_code, 503);
        assert!(err.is_transient());
        assert!(err.details.is_none());

        let err = OpenRouterClient::handle_api_error(418, r#"{"error":{"message":"teapot"}}"#);
        assert_eq!(err.message, "teapot");
        assert!(!err.is_transient());

        let err = OpenRouterClient::handle_api_error(404, "not json");
        assert!(err.message.contains("404"));
    }

    #[test]
    fn test_parse_response_decodes_structured_content() {
        let client = OpenRouterClient::with_api_key("key", None).unwrap();
        let raw = RawResponse {
            status: 200,
            body: completion_body(r#"{"title":"X","ingredients":[]}"#).to_string(),
        };
        let request = user_request().with_response_format(recipe_format());

        let response = client.parse_response(raw, &request).unwrap();
        assert_eq!(
            response.first_content().unwrap().as_json().unwrap(),
            &json!({"title": "X", "ingredients": []})
        );
        assert_eq!(response.usage.unwrap().total_tokens, 20);
    }

    #[test]
    fn test_parse_response_strips_code_fences() {
        let client = OpenRouterClient::with_api_key("key", None).unwrap();
        let raw = RawResponse {
            status: 200,
            body: completion_body("```json\n{\"title\":\"Fenced\"}\n```").to_string(),
        };
        let request = user_request().with_response_format(recipe_format());

        let response = client.parse_response(raw, &request).unwrap();
        assert_eq!(response.choices[0].message.content, MessageContent::Json(json!({"title": "Fenced"})));
    }

    #[test]
    fn test_parse_response_rejects_invalid_structured_content() {
        let client = OpenRouterClient::with_api_key("key", None).unwrap();
        let request = user_request().with_response_format(recipe_format());

        let raw = RawResponse {
            status: 200,
            body: completion_body("Here is your recipe: pasta!").to_string(),
        };
        let err = client.parse_response(raw, &request).unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.starts_with("Invalid recipe format"));

        let raw = RawResponse {
            status: 200,
            body: completion_body(r#"{"ingredients":[]}"#).to_string(),
        };
        let err = client.parse_response(raw, &request).unwrap_err();
        assert!(err.message.contains("missing required field 'title'"));

        let raw = RawResponse {
            status: 200,
            body: completion_body(r#"{"title":42}"#).to_string(),
        };
        assert!(client.parse_response(raw, &request).is_err());

        let raw = RawResponse {
            status: 200,
            body: completion_body(r#"["title"]"#).to_string(),
        };
        assert!(client.parse_response(raw, &request).is_err());
    }

    #[test]
    fn test_parse_response_keeps_text_without_format() {
        let client = OpenRouterClient::with_api_key("key", None).unwrap();
        let raw = RawResponse {
            status: 200,
            body: completion_body(r#"{"title":"X"}"#).to_string(),
        };

        let response = client.parse_response(raw, &user_request()).unwrap();
        assert_eq!(response.first_content().unwrap().as_text(), Some(r#"{"title":"X"}"#));
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.created, Some(1_700_000_000));
    }

    #[test]
    fn test_parse_response_rejects_bad_shape() {
        let client = OpenRouterClient::with_api_key("key", None).unwrap();

        for body in [
            json!({"id": "gen-1", "choices": []}).to_string(),
            json!({"choices": [{"message": {"content": "x"}}]}).to_string(),
            "not json".to_string(),
        ] {
            let err = client
                .parse_response(RawResponse { status: 200, body }, &user_request())
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::InternalError);
            assert!(err.message.starts_with("Malformed response"));
        }

        let err = client
            .parse_response(
                RawResponse {
                    status: 401,
                    body: String::new(),
                },
                &user_request(),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_send_request_sets_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("content-type", "application/json"))
            .and(header("HTTP-Referer", "https://larder.example"))
            .and(header("X-Title", "Larder"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hi")))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server).with_app("https://larder.example", "Larder");
        let client = OpenRouterClient::new(config).unwrap();

        let raw = client.send_request(&payload()).await.unwrap();
        assert_eq!(raw.status, 200);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["temperature"], json!(1.0));
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "Hello"}));
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow down"}})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("done")))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let raw = client.send_request(&payload()).await.unwrap();

        assert_eq!(raw.status, 200);
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "No auth credentials found"}})))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.chat_completion(user_request()).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.status_code, 401);
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_bad_request_and_payment_are_not_retried() {
        for status in [400u16, 402] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let client = test_client(&server);
            let err = client.chat_completion(user_request()).await.unwrap_err();
            assert_eq!(err.status_code, status);
            assert_eq!(request_count(&server).await, 1);
        }
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(test_config(&server).with_max_attempts(3)).unwrap();
        let err = client.chat_completion(user_request()).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.status_code, 503);
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("late"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(test_config(&server).with_timeout(50)).unwrap();
        let err = client.chat_completion(user_request()).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("timed out"));
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_network_error_is_classified() {
        let config = OpenRouterConfig::new("test-key")
            .with_base_url("http://127.0.0.1:1")
            .with_retry_delay(1, 1);
        let client = OpenRouterClient::new(config).unwrap();

        let err = client.chat_completion(user_request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.starts_with("Network error"));
        assert!(!err.message.contains("test-key"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let server = MockServer::start().await;
        let client = test_client(&server);

        let request = ChatCompletionRequest::new("m", vec![ChatMessage::assistant("only me")]);
        let err = client.chat_completion(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let request = ChatCompletionRequest::new(" ", vec![ChatMessage::user("hi")]);
        let err = client.chat_completion(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_chat_completion_with_schema_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body(r#"{"title":"X","ingredients":[]}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let schema = json!({"type": "object", "required": ["title"]});
        let response = client
            .chat_completion_with_schema(user_request(), schema.clone(), "recipe", true)
            .await
            .unwrap();

        assert_eq!(
            response.first_content().unwrap().as_json().unwrap(),
            &json!({"title": "X", "ingredients": []})
        );

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["response_format"],
            json!({
                "type": "json_schema",
                "json_schema": {"name": "recipe", "strict": true, "schema": schema}
            })
        );
    }

    #[tokio::test]
    async fn test_outer_cancellation_aborts_pending_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = test_config(&server).with_retry_delay(10_000, 10_000);
        let client = OpenRouterClient::new(config).unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_millis(300),
            client.chat_completion(user_request()),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "openai/gpt-4o-mini", "name": "GPT-4o mini", "context_length": 128000,
                     "pricing": {"prompt": "0.00000015", "completion": "0.0000006"}},
                    {"id": "meta-llama/llama-3.1-8b-instruct"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let models = client.list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "openai/gpt-4o-mini");
        assert_eq!(models[0].context_length, Some(128_000));
        assert!(models[1].name.is_none());
    }

    #[tokio::test]
    async fn test_list_models_classifies_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.list_models().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(request_count(&server).await, 1);
    }
}
