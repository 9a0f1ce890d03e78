//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::pipeline::RetrievalPipeline;
use crate::rag::AnswerEngine;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    k: Option<usize>,
    model: Option<String>,
    restricted: &[String],
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let pipeline = RetrievalPipeline::new(&settings)?;
    let mut engine = AnswerEngine::new(&settings.rag, prompts)?;
    if let Some(model) = model {
        engine = engine.with_model(model);
    }

    let k = k.unwrap_or(settings.retrieval.top_k);
    let spinner = Output::spinner("Searching knowledge base...");

    let result = async {
        let retrieval = pipeline.retrieve(question, k).await?;
        engine.answer(question, &retrieval, restricted).await
    }
    .await;
    spinner.finish_and_clear();

    match result {
        Ok(answer) => {
            println!("\n{}\n", answer.text);

            if !answer.sources.is_empty() {
                Output::header("Sources");
                for (rank, source) in answer.sources.iter().enumerate() {
                    Output::search_result(
                        rank + 1,
                        &source.title,
                        source.score,
                        &source.content,
                        &source.source_url,
                    );
                }
            }

            if !answer.restricted.is_empty() {
                Output::header("Unavailable sources");
                for url in &answer.restricted {
                    Output::list_item(url);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
