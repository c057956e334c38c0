//! # Larder Core
//!
//! Core types, traits, and recipe generation logic for Larder.
//! This crate defines the data model, the shared error taxonomy and the
//! seams that upstream connectors and storage adapters implement.

pub mod errors;
pub mod generation;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use errors::{ClassifiedError, ErrorCode, LarderResult};
pub use generation::{GenerateFromExisting, GenerationSettings, RecipeGenerationService, RecipeGenerator};
pub use traits::{ChatCompletionClient, ProfileStore, RecipeStore};
pub use types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Recipe, Role};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::generation::*;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
