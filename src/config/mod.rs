//! Configuration module for Lodestar.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RagPrompts};
pub use settings::{
    ChunkingSettings, EmbeddingSettings, GeneralSettings, PageSettings, PromptSettings,
    RagSettings, RedditSettings, RetrievalSettings, Settings, VectorStoreSettings,
    YoutubeSettings,
};
