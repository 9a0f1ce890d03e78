//! Lodestar - retrieval-augmented answers over scraped sources
//!
//! Lodestar keeps a local knowledge base of web pages, Reddit threads and
//! video transcripts, and answers questions from it with cited sources.
//!
//! # Overview
//!
//! Ingestion splits each document into overlapping token windows, embeds
//! them, and stores every vector in an index under a sequential id. A
//! metadata store maps the same ids back to the source URL, title and chunk
//! text. Retrieval embeds the question, finds the nearest chunks by cosine
//! similarity, and joins them with their metadata.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `sources` - Source documents and scrapers (web pages, Reddit, YouTube transcripts)
//! - `chunking` - Token-window chunking
//! - `embedding` - Embedding generation
//! - `vector_store` - Vector index backends
//! - `metadata` - Id-keyed chunk metadata
//! - `store` - The paired index and metadata store
//! - `pipeline` - Ingest and retrieve
//! - `rag` - Context rendering and answer generation
//!
//! # Example
//!
//! ```rust,no_run
//! use lodestar::config::Settings;
//! use lodestar::pipeline::RetrievalPipeline;
//! use lodestar::sources::SourceDocument;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let mut pipeline = RetrievalPipeline::new(&settings)?;
//!
//!     let report = pipeline
//!         .ingest(&[SourceDocument::new(
//!             "https://example.com/gold",
//!             "Gold bars",
//!             "Gold bar locations are in chapter 2.",
//!         )])
//!         .await?;
//!     println!("Indexed {} chunks", report.chunks_indexed);
//!
//!     let retrieval = pipeline.retrieve("Where are the gold bars?", 2).await?;
//!     println!("{}", retrieval.render());
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod metadata;
pub mod openai;
pub mod pipeline;
pub mod rag;
pub mod sources;
pub mod store;
pub mod vector_store;

pub use error::{LodestarError, Result};
