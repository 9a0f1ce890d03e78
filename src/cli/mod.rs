//! CLI module for Lodestar.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lodestar - retrieval-augmented answers over scraped guides, threads and transcripts
#[derive(Parser, Debug)]
#[command(name = "lodestar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "LODESTAR_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and index scraped sources
    Ingest {
        /// JSON file with an array of {source_url, title, content, restricted}
        file: Option<PathBuf>,

        /// Web page URLs to scrape and index
        #[arg(long = "page", value_name = "URL")]
        page: Vec<String>,

        /// Reddit thread URLs to scrape and index
        #[arg(long = "reddit", value_name = "URL")]
        reddit: Vec<String>,

        /// YouTube video URLs whose transcripts are indexed (needs yt-dlp)
        #[arg(long = "youtube", value_name = "URL")]
        youtube: Vec<String>,
    },

    /// Show the chunks most similar to a query
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Ask a question and get an answer with sources
    Ask {
        /// The question to ask
        question: String,

        /// Number of context chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,

        /// LLM model to use for response generation
        #[arg(short, long)]
        model: Option<String>,

        /// Source URLs that could not be read, listed for the model
        #[arg(long = "restricted", value_name = "URL")]
        restricted: Vec<String>,
    },

    /// Delete every indexed chunk
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show index statistics
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::parse_from([
            "lodestar",
            "-vv",
            "ingest",
            "pages.json",
            "--reddit",
            "https://www.reddit.com/r/a/comments/1/x/",
            "--reddit",
            "https://www.reddit.com/r/b/comments/2/y/",
            "--page",
            "https://guides.example/gold",
            "--youtube",
            "https://youtu.be/dQw4w9WgXcQ",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ingest {
                file,
                page,
                reddit,
                youtube,
            } => {
                assert_eq!(file, Some(PathBuf::from("pages.json")));
                assert_eq!(page, vec!["https://guides.example/gold".to_string()]);
                assert_eq!(reddit.len(), 2);
                assert_eq!(youtube.len(), 1);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["lodestar", "ask", "where is the gold?", "-k", "4"]);
        match cli.command {
            Commands::Ask { question, k, model, restricted } => {
                assert_eq!(question, "where is the gold?");
                assert_eq!(k, Some(4));
                assert!(model.is_none());
                assert!(restricted.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
