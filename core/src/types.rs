//! Core data types for Larder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of a message author in a chat completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A message in a chat completion request.
///
/// The role stays a plain string so that requests deserialized from callers
/// can be checked (and rejected) by message validation rather than by serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender ("system", "user", "assistant")
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Request for a single, stateless chat completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Upstream model identifier (e.g. "openai/gpt-4o-mini")
    pub model: String,
    /// Conversation, ending on a user turn
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature, 1.0 when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Constrains the output to a JSON schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormatSpec>,
}

impl ChatCompletionRequest {
    /// Create a new request for the given model and messages
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            response_format: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_response_format(mut self, response_format: ResponseFormatSpec) -> Self {
        self.response_format = Some(response_format);
        self
    }
}

/// Structured output constraint sent as `response_format`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormatSpec {
    /// `{"type": "json_schema", "json_schema": {...}}`
    JsonSchema { json_schema: JsonSchemaSpec },
}

impl ResponseFormatSpec {
    pub fn json_schema(name: impl Into<String>, strict: bool, schema: serde_json::Value) -> Self {
        ResponseFormatSpec::JsonSchema {
            json_schema: JsonSchemaSpec {
                name: name.into(),
                strict,
                schema,
            },
        }
    }

    /// The declared schema, for shape checks on decoded output
    pub fn schema_spec(&self) -> &JsonSchemaSpec {
        match self {
            ResponseFormatSpec::JsonSchema { json_schema } => json_schema,
        }
    }
}

/// Named JSON schema the upstream output must conform to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

/// Parsed chat completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Content of the first choice
    pub fn first_content(&self) -> Option<&MessageContent> {
        self.choices.first().map(|choice| &choice.message.content)
    }
}

/// Individual choice in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: String,
}

/// Message in a choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Choice content: raw text, or JSON decoded under a response schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Json(serde_json::Value),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            MessageContent::Json(value) => Some(value),
            MessageContent::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            MessageContent::Json(value) => Some(value),
            MessageContent::Text(_) => None,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Entry of the upstream model catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<serde_json::Value>,
}

/// A recipe as held by the recipe store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Free-form body text (ingredients, steps, notes)
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the recipe is soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Recipe {
    /// Create a new private recipe owned by `owner_id`
    pub fn new(owner_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            content: content.into(),
            is_public: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether `user_id` may read this recipe
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        self.is_public || self.owner_id == user_id
    }
}

/// Title and body of a recipe used as generation context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSource {
    pub title: String,
    pub content: String,
}

impl RecipeSource {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

impl From<&Recipe> for RecipeSource {
    fn from(recipe: &Recipe) -> Self {
        Self::new(recipe.title.clone(), recipe.content.clone())
    }
}

/// Dietary preferences stored on a user profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietaryPreferences {
    #[serde(default)]
    pub diets: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub disliked_ingredients: Vec<String>,
    #[serde(default)]
    pub calorie_target: Option<u32>,
}

/// Ingredient line of a generated recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedIngredient {
    pub name: String,
    #[serde(default, deserialize_with = "quantity_text")]
    pub quantity: String,
}

/// Models sometimes emit bare numbers (`"quantity": 2`) for counted items
fn quantity_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(String::new()),
        other => display_scalar(&other)
            .or_else(|| other.as_str().map(str::to_string))
            .ok_or_else(|| serde::de::Error::custom("quantity must be a string or a number")),
    }
}

/// Typed view of a generated recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecipe {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<GeneratedIngredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub prep_time: Option<serde_json::Value>,
    #[serde(default)]
    pub cook_time: Option<serde_json::Value>,
    #[serde(default)]
    pub servings: Option<serde_json::Value>,
}

impl GeneratedRecipe {
    /// Convert the structured output of a generation call
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Render as recipe body text for storage
    pub fn to_content(&self) -> String {
        let mut sections = Vec::new();

        if let Some(description) = self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            sections.push(description.to_string());
        }

        let mut timing = Vec::new();
        if let Some(prep) = self.prep_time.as_ref().and_then(display_scalar) {
            timing.push(format!("Prep time: {}", prep));
        }
        if let Some(cook) = self.cook_time.as_ref().and_then(display_scalar) {
            timing.push(format!("Cook time: {}", cook));
        }
        if let Some(servings) = self.servings.as_ref().and_then(display_scalar) {
            timing.push(format!("Servings: {}", servings));
        }
        if !timing.is_empty() {
            sections.push(timing.join("\n"));
        }

        if !self.ingredients.is_empty() {
            let lines: Vec<String> = self
                .ingredients
                .iter()
                .map(|i| {
                    if i.quantity.trim().is_empty() {
                        format!("- {}", i.name)
                    } else {
                        format!("- {} {}", i.quantity, i.name)
                    }
                })
                .collect();
            sections.push(format!("Ingredients:\n{}", lines.join("\n")));
        }

        if !self.instructions.is_empty() {
            let steps: Vec<String> = self
                .instructions
                .iter()
                .enumerate()
                .map(|(n, step)| format!("{}. {}", n + 1, step))
                .collect();
            sections.push(format!("Instructions:\n{}", steps.join("\n")));
        }

        sections.join("\n\n")
    }
}

fn display_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
