//! Retrieval results and answer generation.
//!
//! The pipeline returns a [`Retrieval`]: either ranked [`ContextBlock`]s or
//! an explicit "no data" outcome. [`AnswerEngine`] turns that into an LLM
//! answer with sources.

mod answer;
pub mod context;

pub use answer::{Answer, AnswerEngine};
pub use context::{render_context, NO_DATA_MESSAGE};

/// One retrieved chunk joined with its source metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub id: u64,
    /// Cosine similarity to the query.
    pub score: f32,
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub chunk_index: u32,
}

/// Outcome of a retrieval query.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// The store holds nothing yet.
    NoData,
    /// Blocks ordered by descending similarity. May be empty when every hit
    /// lacked metadata.
    Hits(Vec<ContextBlock>),
}

impl Retrieval {
    pub fn blocks(&self) -> &[ContextBlock] {
        match self {
            Retrieval::NoData => &[],
            Retrieval::Hits(blocks) => blocks,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Retrieval::NoData)
    }

    /// The context string handed to the answer model.
    pub fn render(&self) -> String {
        match self {
            Retrieval::NoData => NO_DATA_MESSAGE.to_string(),
            Retrieval::Hits(blocks) => render_context(blocks),
        }
    }
}
