//! Reset command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::KnowledgeStore;
use anyhow::Result;

/// Run the reset command.
pub fn run_reset(yes: bool, settings: Settings) -> Result<()> {
    let mut store = KnowledgeStore::open(&settings)?;

    if store.is_empty()? {
        Output::info("Index is already empty.");
        return Ok(());
    }

    if !yes {
        let message = format!("Delete all {} indexed chunks?", store.len()?);
        if !Output::confirm(&message)? {
            Output::info("Aborted.");
            return Ok(());
        }
    }

    store.reset()?;
    Output::success("Index has been reset.");
    Ok(())
}
