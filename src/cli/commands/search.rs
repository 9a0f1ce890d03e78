//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::RetrievalPipeline;
use crate::rag::{Retrieval, NO_DATA_MESSAGE};
use anyhow::Result;

/// Run the search command.
pub async fn run_search(query: &str, k: Option<usize>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = RetrievalPipeline::new(&settings)?;
    let k = k.unwrap_or(settings.retrieval.top_k);

    let spinner = Output::spinner("Searching...");
    let retrieval = pipeline.retrieve(query, k).await;
    spinner.finish_and_clear();

    match retrieval {
        Ok(Retrieval::NoData) => Output::warning(NO_DATA_MESSAGE),
        Ok(Retrieval::Hits(blocks)) if blocks.is_empty() => {
            Output::warning("No results found matching your query.");
        }
        Ok(Retrieval::Hits(blocks)) => {
            Output::success(&format!("Found {} results", blocks.len()));
            for (rank, block) in blocks.iter().enumerate() {
                Output::search_result(
                    rank + 1,
                    &block.title,
                    block.score,
                    &block.content,
                    &block.source_url,
                );
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
