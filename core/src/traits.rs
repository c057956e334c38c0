//! Core traits defining the seams between Larder components

use crate::errors::ClassifiedError;
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, DietaryPreferences, ModelInfo, Recipe,
    ResponseFormatSpec,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Trait for upstream chat-completion clients
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Validate, send and parse a single completion request
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ClassifiedError>;

    /// Send a completion request whose output must conform to `schema`
    async fn chat_completion_with_schema(
        &self,
        request: ChatCompletionRequest,
        schema: serde_json::Value,
        schema_name: &str,
        strict: bool,
    ) -> Result<ChatCompletionResponse, ClassifiedError> {
        let request =
            request.with_response_format(ResponseFormatSpec::json_schema(schema_name, strict, schema));
        self.chat_completion(request).await
    }

    /// List the models offered by the upstream
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ClassifiedError>;
}

/// Persistence interface for recipes
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Get a recipe by ID, including soft-deleted ones
    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, ClassifiedError>;

    /// Insert a new recipe
    async fn insert_recipe(&self, recipe: Recipe) -> Result<Uuid, ClassifiedError>;

    /// Replace an existing recipe
    async fn update_recipe(&self, recipe: Recipe) -> Result<Recipe, ClassifiedError>;

    /// Mark a recipe as deleted. Returns false if it was already deleted.
    async fn soft_delete_recipe(&self, id: Uuid) -> Result<bool, ClassifiedError>;
}

/// Persistence interface for user profile preferences
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Get the dietary preferences of a user, if a profile exists
    async fn get_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DietaryPreferences>, ClassifiedError>;

    /// Create or replace the dietary preferences of a user
    async fn upsert_preferences(
        &self,
        user_id: Uuid,
        preferences: DietaryPreferences,
    ) -> Result<(), ClassifiedError>;
}
