//! Configuration settings for Lodestar.

use crate::vector_store::IndexBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub vector_store: VectorStoreSettings,
    pub retrieval: RetrievalSettings,
    pub rag: RagSettings,
    pub reddit: RedditSettings,
    pub page: PageSettings,
    pub youtube: YoutubeSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory holding the index and metadata files.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.lodestar".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Documents embedded concurrently during one ingest call.
    pub max_concurrent: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_concurrent: 4,
        }
    }
}

/// Token-window chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum tokens per chunk.
    pub max_tokens: usize,
    /// Tokens shared between consecutive chunks.
    pub overlap: usize,
    /// Model whose tokenizer is used for token accounting.
    pub encoding_model: String,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            overlap: 100,
            encoding_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Vector store settings. Store files live under `general.data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Index backend (idmap, memory, sqlite).
    pub backend: IndexBackend,
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks retrieved per question.
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 2 }
    }
}

/// RAG (Retrieval-Augmented Generation) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// LLM model for answer generation.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
        }
    }
}

/// Reddit thread scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    /// Maximum number of comments appended to the post body.
    pub max_comments: usize,
    /// User agent sent to reddit.com.
    pub user_agent: String,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            max_comments: 5,
            user_agent: concat!("lodestar/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Web page scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    /// User agent sent with page requests. Many sites refuse unknown agents.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 10,
        }
    }
}

/// YouTube transcript settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// Caption language code.
    pub language: String,
    /// Path to the yt-dlp executable.
    pub ytdlp_path: String,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LodestarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lodestar")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Snapshot file of the idmap backend.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir().join("index.bin")
    }

    /// Database file of the sqlite backend.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir().join("vectors.db")
    }

    /// Metadata file paired with the configured backend. Each backend keeps
    /// its own, so switching backends never touches another backend's data.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir()
            .join(format!("{}-metadata.bin", self.vector_store.backend))
    }

    /// Keep every store file inside `dir`.
    pub fn with_store_dir(mut self, dir: &std::path::Path) -> Self {
        self.general.data_dir = dir.display().to_string();
        self
    }
}
