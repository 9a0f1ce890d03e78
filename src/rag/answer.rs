//! LLM answer generation over retrieved context.

use super::context::render_restricted;
use super::{ContextBlock, Retrieval, NO_DATA_MESSAGE};
use crate::config::{Prompts, RagSettings};
use crate::error::{LodestarError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Answers questions from retrieved context with a chat model.
pub struct AnswerEngine {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    prompts: Prompts,
}

impl AnswerEngine {
    pub fn new(settings: &RagSettings, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            prompts,
        })
    }

    /// Override the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fill the user template with the question, context and restricted URLs.
    pub fn user_prompt(&self, question: &str, retrieval: &Retrieval, restricted: &[String]) -> String {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), retrieval.render());
        vars.insert("restricted".to_string(), render_restricted(restricted));
        self.prompts.render_with_custom(&self.prompts.rag.user, &vars)
    }

    /// Generate an answer. An empty store is answered without calling the model.
    #[instrument(skip(self, retrieval, restricted), fields(question = %question))]
    pub async fn answer(
        &self,
        question: &str,
        retrieval: &Retrieval,
        restricted: &[String],
    ) -> Result<Answer> {
        if retrieval.is_no_data() {
            info!("Store is empty, skipping model call");
            return Ok(Answer {
                text: NO_DATA_MESSAGE.to_string(),
                sources: Vec::new(),
                restricted: restricted.to_vec(),
            });
        }

        let system = self
            .prompts
            .render_with_custom(&self.prompts.rag.system, &HashMap::new());
        let user = self.user_prompt(question, retrieval, restricted);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| LodestarError::Rag(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| LodestarError::Rag(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| LodestarError::Rag(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            LodestarError::OpenAI(format!("Failed to generate response: {}", e))
        })?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| LodestarError::Rag("Empty response from LLM".to_string()))?
            .clone();

        debug!("Generated answer from {} blocks", retrieval.blocks().len());

        Ok(Answer {
            text,
            sources: retrieval.blocks().to_vec(),
            restricted: restricted.to_vec(),
        })
    }
}

/// A generated answer with the context it was based on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ContextBlock>,
    /// Sources that could not be read, offered as links.
    pub restricted: Vec<String>,
}

impl Answer {
    /// Format the answer for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.text.clone();

        if !self.sources.is_empty() {
            output.push_str("\n\n--- Sources ---\n");
            for source in &self.sources {
                let label = if source.title.is_empty() {
                    &source.source_url
                } else {
                    &source.title
                };
                output.push_str(&format!("\n{} (score: {:.2})", label, source.score));
                output.push_str(&format!("\n  {}", source.source_url));
            }
        }

        if !self.restricted.is_empty() {
            output.push_str("\n\n--- Unavailable sources ---\n");
            for url in &self.restricted {
                output.push_str(&format!("\n  {}", url));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AnswerEngine {
        let mut prompts = Prompts::default();
        prompts
            .variables
            .insert("game".to_string(), "Red Dead Redemption 2".to_string());
        prompts.rag.user = "{{game}}|{{context}}|{{restricted}}|{{question}}".to_string();
        AnswerEngine::new(&RagSettings::default(), prompts).unwrap()
    }

    #[test]
    fn test_user_prompt_fills_all_slots() {
        let retrieval = Retrieval::Hits(vec![ContextBlock {
            id: 3,
            score: 0.8,
            source_url: "a.com".to_string(),
            title: String::new(),
            content: "gold bars".to_string(),
            chunk_index: 0,
        }]);

        let prompt = engine().user_prompt("where?", &retrieval, &["x.com".to_string()]);
        assert_eq!(prompt, "Red Dead Redemption 2|a.com\ngold bars\n|- x.com|where?");
    }

    #[tokio::test]
    async fn test_no_data_skips_model() {
        let answer = engine()
            .answer("where?", &Retrieval::NoData, &["x.com".to_string()])
            .await
            .unwrap();
        assert_eq!(answer.text, NO_DATA_MESSAGE);
        assert!(answer.sources.is_empty());
        assert!(answer.format_for_display().contains("x.com"));
    }
}
