//! Prompt templates for Lodestar.
//!
//! Prompts can be customized by placing a `rag.toml` file in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub rag: RagPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagPrompts {
    pub system: String,
    pub user: String,
}

impl Default for RagPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an expert video game assistant specializing in open-world games.
You help players by drawing on guides, forum threads, and video transcripts retrieved for their question.

How to respond:
1. Video answers
   - If the solution appears in a YouTube transcript, give the timestamp range (e.g. 3:45 - 5:10) so the player can watch it directly.
   - Also summarize the solution in text.
2. Forum and article answers
   - Extract the key steps and give a short, structured answer.
   - Include the source link.
3. Unavailable sources
   - Only when the context above is not enough: list the sources that could not be read and say they may still be useful.

If the context does not contain enough information to answer, say so plainly and point to the external sources."#
                .to_string(),

            user: r#"Context:
{{context}}

Unavailable sources:
{{restricted}}

Question: {{question}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts with an optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let rag_path = custom_path.join("rag.toml");
            if rag_path.exists() {
                let content = std::fs::read_to_string(&rag_path)?;
                prompts.rag = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
