//! In-memory implementation of RecipeStore and ProfileStore for testing and development

use async_trait::async_trait;
use chrono::Utc;
use larder_core::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Configuration for in-memory store
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of recipes to store, soft-deleted ones included
    pub max_recipes: Option<usize>,
    /// Whether to enable verbose logging
    pub verbose: bool,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_recipes: Some(100_000),
            verbose: false,
        }
    }
}

/// In-memory data store
#[derive(Debug, Default)]
struct MemoryStore {
    /// Recipes indexed by ID
    recipes: HashMap<Uuid, Recipe>,
    /// Index: owner_id -> recipe_ids
    recipes_by_owner: HashMap<Uuid, Vec<Uuid>>,
    /// Preferences indexed by user ID
    preferences: HashMap<Uuid, DietaryPreferences>,
}

impl MemoryStore {
    fn insert_recipe(&mut self, recipe: Recipe) {
        // Update owner index
        self.recipes_by_owner
            .entry(recipe.owner_id)
            .or_insert_with(Vec::new)
            .push(recipe.id);

        self.recipes.insert(recipe.id, recipe);
    }

    fn live_recipe_mut(&mut self, id: Uuid) -> Option<&mut Recipe> {
        self.recipes.get_mut(&id).filter(|r| !r.is_deleted())
    }

    fn stats(&self) -> (usize, usize) {
        (self.recipes.len(), self.preferences.len())
    }
}

/// In-memory RecipeStore and ProfileStore implementation
pub struct InMemoryStore {
    store: Arc<RwLock<MemoryStore>>,
    config: InMemoryConfig,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::new_with_config(InMemoryConfig::default())
    }

    /// Create a new in-memory store with configuration
    pub fn new_with_config(config: InMemoryConfig) -> Self {
        info!("Creating in-memory store with config: {:?}", config);
        Self {
            store: Arc::new(RwLock::new(MemoryStore::default())),
            config,
        }
    }

    /// Live (not soft-deleted) recipes of an owner, oldest first
    pub async fn recipes_by_owner(&self, owner_id: Uuid) -> Vec<Recipe> {
        let store = self.store.read().await;
        store
            .recipes_by_owner
            .get(&owner_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| store.recipes.get(id))
                    .filter(|r| !r.is_deleted())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get statistics about the store: (recipes, profiles)
    pub async fn stats(&self) -> (usize, usize) {
        let store = self.store.read().await;
        store.stats()
    }

    /// Clear all data from the store
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        *store = MemoryStore::default();
        info!("Cleared in-memory store");
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecipeStore for InMemoryStore {
    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, ClassifiedError> {
        let store = self.store.read().await;
        Ok(store.recipes.get(&id).cloned())
    }

    async fn insert_recipe(&self, recipe: Recipe) -> Result<Uuid, ClassifiedError> {
        let mut store = self.store.write().await;

        if self.config.verbose {
            debug!("Inserting recipe {} for owner {}", recipe.id, recipe.owner_id);
        }

        // Check limits
        if let Some(max_recipes) = self.config.max_recipes {
            if store.recipes.len() >= max_recipes {
                return Err(ClassifiedError::internal(format!(
                    "Maximum recipe limit ({}) reached",
                    max_recipes
                )));
            }
        }

        if store.recipes.contains_key(&recipe.id) {
            return Err(ClassifiedError::validation(format!(
                "Recipe {} already exists",
                recipe.id
            )));
        }

        if recipe.title.trim().is_empty() {
            return Err(ClassifiedError::validation("Recipe title must not be empty"));
        }

        let id = recipe.id;
        store.insert_recipe(recipe);
        Ok(id)
    }

    async fn update_recipe(&self, mut recipe: Recipe) -> Result<Recipe, ClassifiedError> {
        let mut store = self.store.write().await;

        let existing = store
            .live_recipe_mut(recipe.id)
            .ok_or_else(|| ClassifiedError::not_found(format!("Recipe {} not found", recipe.id)))?;

        if existing.owner_id != recipe.owner_id {
            return Err(ClassifiedError::forbidden(format!(
                "Recipe {} cannot change owner",
                recipe.id
            )));
        }

        recipe.created_at = existing.created_at;
        recipe.updated_at = Utc::now();
        recipe.deleted_at = None;
        *existing = recipe.clone();

        if self.config.verbose {
            debug!("Updated recipe {}", recipe.id);
        }

        Ok(recipe)
    }

    async fn soft_delete_recipe(&self, id: Uuid) -> Result<bool, ClassifiedError> {
        let mut store = self.store.write().await;

        let recipe = store
            .recipes
            .get_mut(&id)
            .ok_or_else(|| ClassifiedError::not_found(format!("Recipe {} not found", id)))?;

        if recipe.is_deleted() {
            return Ok(false);
        }

        let now = Utc::now();
        recipe.deleted_at = Some(now);
        recipe.updated_at = now;

        if self.config.verbose {
            debug!("Soft-deleted recipe {}", id);
        }

        Ok(true)
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DietaryPreferences>, ClassifiedError> {
        let store = self.store.read().await;
        Ok(store.preferences.get(&user_id).cloned())
    }

    async fn upsert_preferences(
        &self,
        user_id: Uuid,
        preferences: DietaryPreferences,
    ) -> Result<(), ClassifiedError> {
        let mut store = self.store.write().await;

        if self.config.verbose {
            debug!("Upserting preferences for user {}", user_id);
        }

        store.preferences.insert(user_id, preferences);
        Ok(())
    }
}
