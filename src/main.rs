//! Lodestar CLI entry point.

use anyhow::Result;
use clap::Parser;
use lodestar::cli::{commands, Cli, Commands};
use lodestar::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(|p| Settings::expand_path(p))
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(&config_path))?;

    // -v flags win over the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("lodestar={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::Ingest {
            file,
            page,
            reddit,
            youtube,
        } => {
            commands::run_ingest(file.as_deref(), page, reddit, youtube, settings).await?;
        }

        Commands::Search { query, k } => {
            commands::run_search(query, *k, settings).await?;
        }

        Commands::Ask {
            question,
            k,
            model,
            restricted,
        } => {
            commands::run_ask(question, *k, model.clone(), restricted, settings).await?;
        }

        Commands::Reset { yes } => {
            commands::run_reset(*yes, settings)?;
        }

        Commands::Stats => {
            commands::run_stats(settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings, &config_path)?;
        }
    }

    Ok(())
}
