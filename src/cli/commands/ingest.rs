//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::RetrievalPipeline;
use crate::sources::{
    partition_scraped, PageScraper, RedditScraper, ScrapedSource, Scraper, YoutubeScraper,
};
use anyhow::{Context, Result};
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(
    file: Option<&Path>,
    pages: &[String],
    reddit: &[String],
    youtube: &[String],
    settings: Settings,
) -> Result<()> {
    if file.is_none() && pages.is_empty() && reddit.is_empty() && youtube.is_empty() {
        anyhow::bail!("Nothing to ingest: pass a JSON file or --page, --reddit, --youtube URLs");
    }

    let mut checks = preflight::check(Operation::Ingest);
    if checks.is_ok() && !youtube.is_empty() {
        checks = preflight::check_tool(&settings.youtube.ytdlp_path);
    }
    if let Err(e) = checks {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let mut scraped = match file {
        Some(path) => read_sources(path)?,
        None => Vec::new(),
    };
    if !pages.is_empty() {
        let scraper = PageScraper::new(&settings.page)?;
        scraped.extend(scrape_all(&scraper, pages, "Scraping pages").await);
    }
    if !reddit.is_empty() {
        let scraper = RedditScraper::new(&settings.reddit)?;
        scraped.extend(scrape_all(&scraper, reddit, "Scraping Reddit").await);
    }
    if !youtube.is_empty() {
        let scraper = YoutubeScraper::new(&settings.youtube)?;
        scraped.extend(scrape_all(&scraper, youtube, "Fetching transcripts").await);
    }

    let (documents, restricted) = partition_scraped(scraped);

    if !restricted.is_empty() {
        Output::warning(&format!("{} sources could not be read:", restricted.len()));
        for url in &restricted {
            Output::list_item(url);
        }
    }
    if documents.is_empty() {
        Output::warning("No readable documents to index.");
        return Ok(());
    }

    let mut pipeline = RetrievalPipeline::new(&settings)?;

    let spinner = Output::spinner(&format!("Indexing {} documents...", documents.len()));
    let report = pipeline.ingest(&documents).await;
    spinner.finish_and_clear();

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Indexing failed, nothing was stored: {}", e));
            return Err(e.into());
        }
    };

    Output::success(&format!(
        "Indexed {} chunks from {} documents",
        report.chunks_indexed, report.documents_indexed
    ));
    if report.skipped > 0 {
        Output::info(&format!("Skipped {} empty documents", report.skipped));
    }
    if !report.failures.is_empty() {
        Output::warning(&format!("{} documents failed:", report.failures.len()));
        for failure in &report.failures {
            Output::list_item(&format!("{}: {}", failure.source_url, failure.error));
        }
    }

    Ok(())
}

fn read_sources(path: &Path) -> Result<Vec<ScrapedSource>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let sources: Vec<ScrapedSource> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of sources", path.display()))?;
    Ok(sources)
}

/// Scrape every URL. Unsupported or failing URLs come back restricted.
async fn scrape_all(scraper: &dyn Scraper, urls: &[String], label: &str) -> Vec<ScrapedSource> {
    let pb = Output::progress_bar(urls.len() as u64, label);

    let mut scraped = Vec::with_capacity(urls.len());
    for url in urls {
        if !scraper.can_handle(url) {
            pb.suspend(|| Output::warning(&format!("Unsupported URL: {}", url)));
            scraped.push(ScrapedSource::restricted(url.as_str()));
        } else {
            match scraper.scrape(url).await {
                Ok(source) => scraped.push(source),
                Err(e) => {
                    pb.suspend(|| Output::warning(&format!("Failed to scrape {}: {}", url, e)));
                    scraped.push(ScrapedSource::restricted(url.as_str()));
                }
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    scraped
}
