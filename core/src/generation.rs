//! Recipe generation on top of a chat-completion client

use crate::errors::ClassifiedError;
use crate::traits::{ChatCompletionClient, ProfileStore, RecipeStore};
use crate::types::{
    ChatCompletionRequest, ChatMessage, DietaryPreferences, GeneratedRecipe, Recipe, RecipeSource,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name under which the recipe schema is declared upstream
pub const RECIPE_SCHEMA_NAME: &str = "recipe";

const SYSTEM_PROMPT: &str = "You are a professional chef and recipe developer. \
Create a new, complete recipe from the context the user provides. \
Respect every dietary preference, allergen and disliked ingredient listed. \
Respond only with a recipe object matching the requested JSON schema.";

/// JSON schema of a generated recipe. Only `title` is required.
pub fn recipe_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "description": { "type": "string" },
            "ingredients": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "quantity": { "type": "string" }
                    },
                    "required": ["name", "quantity"]
                }
            },
            "instructions": {
                "type": "array",
                "items": { "type": "string" }
            },
            "prep_time": { "type": "string" },
            "cook_time": { "type": "string" },
            "servings": { "type": "integer" }
        },
        "required": ["title"]
    })
}

/// Model parameters used for generation requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: Some(2048),
        }
    }
}

impl GenerationSettings {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Context for generating a recipe from existing recipes and preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateFromExisting {
    #[serde(default)]
    pub existing_recipes: Vec<RecipeSource>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub diets: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub disliked_ingredients: Vec<String>,
    #[serde(default)]
    pub calorie_target: Option<u32>,
}

impl GenerateFromExisting {
    pub fn new(existing_recipes: Vec<RecipeSource>) -> Self {
        Self {
            existing_recipes,
            ..Default::default()
        }
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    /// Copy every preference field from a stored profile
    pub fn with_preferences(mut self, preferences: DietaryPreferences) -> Self {
        self.diets = preferences.diets;
        self.allergens = preferences.allergens;
        self.disliked_ingredients = preferences.disliked_ingredients;
        self.calorie_target = preferences.calorie_target;
        self
    }

    fn custom_instructions(&self) -> Option<&str> {
        self.custom_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    fn has_preferences(&self) -> bool {
        has_entries(&self.diets)
            || has_entries(&self.allergens)
            || has_entries(&self.disliked_ingredients)
            || self.calorie_target().is_some()
    }

    /// A zero target means no target
    fn calorie_target(&self) -> Option<u32> {
        self.calorie_target.filter(|c| *c > 0)
    }

    /// Whether there is any source of generation context at all
    pub fn has_context(&self) -> bool {
        !self.existing_recipes.is_empty()
            || self.has_preferences()
            || self.custom_instructions().is_some()
    }

    /// Render the user turn of the generation conversation
    pub fn build_user_prompt(&self) -> String {
        let mut sections = Vec::new();

        if self.existing_recipes.is_empty() {
            sections.push("Create a new recipe.".to_string());
        } else {
            let recipes: Vec<String> = self
                .existing_recipes
                .iter()
                .enumerate()
                .map(|(n, recipe)| format!("Recipe {}: {}\n{}", n + 1, recipe.title, recipe.content))
                .collect();
            sections.push(format!(
                "Create a new recipe based on the following existing recipe(s):\n\n{}",
                recipes.join("\n\n")
            ));
        }

        let mut preferences = Vec::new();
        if has_entries(&self.diets) {
            preferences.push(format!("Dietary preferences: {}", join_entries(&self.diets)));
        }
        if has_entries(&self.allergens) {
            preferences.push(format!("Allergens to avoid: {}", join_entries(&self.allergens)));
        }
        if has_entries(&self.disliked_ingredients) {
            preferences.push(format!(
                "Disliked ingredients to avoid: {}",
                join_entries(&self.disliked_ingredients)
            ));
        }
        if let Some(calories) = self.calorie_target() {
            preferences.push(format!(
                "Target calorie range: around {} calories per serving",
                calories
            ));
        }
        if !preferences.is_empty() {
            sections.push(preferences.join("\n"));
        }

        if let Some(instructions) = self.custom_instructions() {
            sections.push(format!("Additional instructions: {}", instructions));
        }

        sections.join("\n\n")
    }
}

fn has_entries(values: &[String]) -> bool {
    values.iter().any(|v| !v.trim().is_empty())
}

fn join_entries(values: &[String]) -> String {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns recipes and dietary preferences into a structured new recipe
#[derive(Clone)]
pub struct RecipeGenerator {
    client: Arc<dyn ChatCompletionClient>,
    settings: GenerationSettings,
}

impl RecipeGenerator {
    /// Create a generator with default settings
    pub fn new(client: Arc<dyn ChatCompletionClient>) -> Self {
        Self::with_settings(client, GenerationSettings::default())
    }

    pub fn with_settings(client: Arc<dyn ChatCompletionClient>, settings: GenerationSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Build the completion request for a generation context
    pub fn build_request(&self, input: &GenerateFromExisting) -> ChatCompletionRequest {
        let mut request = ChatCompletionRequest::new(
            self.settings.model.clone(),
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(input.build_user_prompt()),
            ],
        )
        .with_temperature(self.settings.temperature);

        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        request
    }

    /// Generate a recipe as structured JSON.
    ///
    /// Fails with `VALIDATION_ERROR` before any upstream call when the input
    /// carries no recipes, no preferences and no custom prompt.
    pub async fn generate_from_existing(
        &self,
        input: GenerateFromExisting,
    ) -> Result<serde_json::Value, ClassifiedError> {
        if !input.has_context() {
            return Err(ClassifiedError::validation(
                "At least one existing recipe, dietary preference or custom prompt is required",
            ));
        }

        debug!(
            "Generating recipe from {} existing recipe(s) with model {}",
            input.existing_recipes.len(),
            self.settings.model
        );
        let start_time = Instant::now();

        let request = self.build_request(&input);
        let response = self
            .client
            .chat_completion_with_schema(request, recipe_schema(), RECIPE_SCHEMA_NAME, false)
            .await?;

        let recipe = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content.into_json())
            .ok_or_else(|| {
                warn!("Generation response carried no structured content");
                ClassifiedError::internal("Invalid recipe format: no structured content in response")
            })?;

        info!(
            "Recipe generated in {}ms: {}",
            start_time.elapsed().as_millis(),
            recipe.get("title").and_then(|t| t.as_str()).unwrap_or("<untitled>")
        );

        Ok(recipe)
    }
}

/// Request-level generation that resolves recipes and preferences from storage
pub struct RecipeGenerationService {
    generator: RecipeGenerator,
    recipes: Arc<dyn RecipeStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl RecipeGenerationService {
    pub fn new(
        generator: RecipeGenerator,
        recipes: Arc<dyn RecipeStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            generator,
            recipes,
            profiles,
        }
    }

    /// Load a recipe the user is allowed to read
    async fn load_visible_recipe(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Recipe, ClassifiedError> {
        let recipe = self
            .recipes
            .get_recipe(recipe_id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| ClassifiedError::not_found(format!("Recipe {} not found", recipe_id)))?;

        if !recipe.is_visible_to(user_id) {
            return Err(ClassifiedError::forbidden(format!(
                "Recipe {} is not accessible to this user",
                recipe_id
            )));
        }

        Ok(recipe)
    }

    /// Generate a variation of a stored recipe adapted to the user's profile
    pub async fn generate_for_user(
        &self,
        user_id: Uuid,
        recipe_id: Uuid,
        custom_prompt: Option<String>,
    ) -> Result<serde_json::Value, ClassifiedError> {
        let recipe = self.load_visible_recipe(user_id, recipe_id).await?;
        let preferences = self
            .profiles
            .get_preferences(user_id)
            .await?
            .unwrap_or_default();

        let mut input =
            GenerateFromExisting::new(vec![RecipeSource::from(&recipe)]).with_preferences(preferences);
        input.custom_prompt = custom_prompt;

        self.generator.generate_from_existing(input).await
    }

    /// Store a generated recipe as a new private recipe of `user_id`
    pub async fn save_generated(
        &self,
        user_id: Uuid,
        generated: serde_json::Value,
    ) -> Result<Recipe, ClassifiedError> {
        let generated = GeneratedRecipe::from_value(generated).map_err(|e| {
            ClassifiedError::validation(format!("Generated recipe is malformed: {}", e))
        })?;

        if generated.title.trim().is_empty() {
            return Err(ClassifiedError::validation("Generated recipe has an empty title"));
        }

        let recipe = Recipe::new(user_id, generated.title.trim(), generated.to_content());
        self.recipes.insert_recipe(recipe.clone()).await?;

        info!("Saved generated recipe {} for user {}", recipe.id, user_id);
        Ok(recipe)
    }
}
