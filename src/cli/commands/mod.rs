//! CLI command implementations.

mod ask;
mod config;
mod ingest;
mod reset;
mod search;
mod stats;

pub use ask::run_ask;
pub use config::run_config;
pub use ingest::run_ingest;
pub use reset::run_reset;
pub use search::run_search;
pub use stats::run_stats;
