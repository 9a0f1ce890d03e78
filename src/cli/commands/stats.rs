//! Stats command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::KnowledgeStore;
use crate::vector_store::IndexBackend;
use anyhow::Result;

/// Run the stats command.
pub fn run_stats(settings: Settings) -> Result<()> {
    let store = KnowledgeStore::open(&settings)?;
    let stats = store.stats()?;

    Output::header("Index");
    Output::kv("Backend", &stats.backend.to_string());
    Output::kv("Dimension", &stats.dimension.to_string());
    Output::kv("Chunks", &stats.entries.to_string());
    Output::kv("Sources", &stats.sources.to_string());

    match stats.backend {
        IndexBackend::IdMap => {
            Output::kv("Index file", &settings.index_path().display().to_string());
            Output::kv("Metadata file", &settings.metadata_path().display().to_string());
        }
        IndexBackend::Sqlite => {
            Output::kv("Database", &settings.sqlite_path().display().to_string());
            Output::kv("Metadata file", &settings.metadata_path().display().to_string());
        }
        IndexBackend::Memory => Output::info("The memory backend keeps nothing between runs."),
    }

    Ok(())
}
