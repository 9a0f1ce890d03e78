//! YouTube transcript scraping.
//!
//! Video metadata and caption track URLs come from `yt-dlp`. The caption
//! track is then fetched in YouTube's `json3` format and turned into a
//! [`ScrapedSource`] that can be ingested like any page.

use super::{ScrapedSource, Scraper};
use crate::config::YoutubeSettings;
use crate::error::{LodestarError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Matches various YouTube URL formats and bare video IDs
        Regex::new(
            r"(?x)
            (?:
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid regex")
    })
}

/// Extract the video id from a YouTube URL or a bare id.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = video_id_regex().captures(input.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// One caption line as returned by transcript services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Build an ingestible source from a video's transcript.
///
/// Each line keeps its timing so answers can point at a moment in the video.
/// A video without transcript lines is reported as restricted.
pub fn transcript_document(
    video: &str,
    title: impl Into<String>,
    lines: &[TranscriptLine],
) -> Result<ScrapedSource> {
    let video_id = extract_video_id(video).ok_or_else(|| {
        LodestarError::InvalidInput(format!("Not a YouTube video: {}", video))
    })?;
    let url = watch_url(&video_id);

    if lines.is_empty() {
        return Ok(ScrapedSource::restricted(url));
    }

    let mut content = String::new();
    for line in lines {
        let _ = writeln!(
            content,
            "{} (start: {}, duration: {})",
            line.text.trim(),
            line.start,
            line.duration
        );
    }

    Ok(ScrapedSource::accessible(url, title, content))
}

/// Scrapes a video's title and caption transcript.
pub struct YoutubeScraper {
    client: reqwest::Client,
    language: String,
    ytdlp: String,
}

impl YoutubeScraper {
    pub fn new(config: &YoutubeSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LodestarError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            language: config.language.clone(),
            ytdlp: config.ytdlp_path.clone(),
        })
    }

    /// Video metadata as printed by `yt-dlp --dump-json`.
    async fn fetch_info(&self, video_id: &str) -> Result<Value> {
        let output = tokio::process::Command::new(&self.ytdlp)
            .args([
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &watch_url(video_id),
            ])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LodestarError::ToolNotFound(self.ytdlp.clone())
                } else {
                    LodestarError::Scrape(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LodestarError::Scrape(format!(
                "Video {} not found or unavailable: {}",
                video_id,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| LodestarError::Scrape(format!("Failed to parse yt-dlp output: {}", e)))
    }
}

#[async_trait]
impl Scraper for YoutubeScraper {
    fn can_handle(&self, url: &str) -> bool {
        let youtube_host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|h| h == "youtu.be" || h == "youtube.com" || h.ends_with(".youtube.com"));
        youtube_host && extract_video_id(url).is_some()
    }

    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> Result<ScrapedSource> {
        let video_id = extract_video_id(url)
            .ok_or_else(|| LodestarError::InvalidInput(format!("Not a YouTube video: {}", url)))?;

        let info = self.fetch_info(&video_id).await?;
        let title = info["title"].as_str().unwrap_or_default().to_string();

        let Some(track) = caption_track_url(&info, &self.language) else {
            warn!("No {} captions for {}, marking restricted", self.language, video_id);
            return transcript_document(&video_id, title, &[]);
        };
        debug!("Fetching captions from {}", track);

        let response = self.client.get(track).send().await?;
        if !response.status().is_success() {
            warn!("Captions not readable ({}), marking restricted", response.status());
            return transcript_document(&video_id, title, &[]);
        }

        let body: Value = response.json().await?;
        let lines = parse_json3(&body);
        info!("Fetched {} transcript lines", lines.len());
        transcript_document(&video_id, title, &lines)
    }
}

/// URL of the `json3` caption track for `language`.
///
/// Uploaded subtitles win over automatic captions. A regional variant such
/// as `en-US` matches `en`.
pub(crate) fn caption_track_url(info: &Value, language: &str) -> Option<String> {
    let regional = format!("{}-", language);

    ["subtitles", "automatic_captions"].iter().find_map(|kind| {
        let tracks = info.get(kind)?.as_object()?;
        let mut languages: Vec<&String> = tracks
            .keys()
            .filter(|lang| *lang == language || lang.starts_with(&regional))
            .collect();
        languages.sort_by_key(|lang| *lang != language);

        languages.into_iter().find_map(|lang| {
            tracks[lang.as_str()]
                .as_array()?
                .iter()
                .find(|track| track["ext"].as_str() == Some("json3"))
                .and_then(|track| track["url"].as_str())
                .map(str::to_string)
        })
    })
}

/// Caption lines from a `json3` track. Events without text are dropped.
pub(crate) fn parse_json3(body: &Value) -> Vec<TranscriptLine> {
    let Some(events) = body["events"].as_array() else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let text: String = event["segs"]
                .as_array()?
                .iter()
                .filter_map(|seg| seg["utf8"].as_str())
                .collect();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }

            Some(TranscriptLine {
                text,
                start: event["tStartMs"].as_f64().unwrap_or_default() / 1000.0,
                duration: event["dDurationMs"].as_f64().unwrap_or_default() / 1000.0,
            })
        })
        .collect()
}
