//! YouTube watch page client
//!
//! Reads the `ytInitialPlayerResponse` blob embedded in the watch page for
//! metadata and caption track discovery, then downloads the selected caption
//! track in the `json3` timed-text format.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

use super::youtube::{MetadataProvider, TranscriptProvider, VideoMetadata, VideoSource, YouTubeVideo};
use crate::http::{ProxyConfig, RetryingFetcher};
use crate::models::CaptionSegment;
use crate::{Result, ScraperError};

const WATCH_URL: &str = "https://www.youtube.com/watch";
const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerResponse {
    #[serde(default)]
    playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    video_details: Option<VideoDetails>,
    #[serde(default)]
    microformat: Option<Microformat>,
    #[serde(default)]
    captions: Option<Captions>,
}

#[derive(Debug, Default, Deserialize)]
struct PlayabilityStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    length_seconds: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    view_count: Option<String>,
    #[serde(default)]
    thumbnail: Option<ThumbnailList>,
}

#[derive(Debug, Default, Deserialize)]
struct ThumbnailList {
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Microformat {
    #[serde(default)]
    player_microformat_renderer: Option<PlayerMicroformat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerMicroformat {
    #[serde(default)]
    publish_date: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    #[serde(default)]
    player_captions_tracklist_renderer: Option<CaptionTracklist>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTracklist {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    language_code: String,
    /// `asr` for auto-generated tracks
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// `json3` timed-text document
#[derive(Debug, Default, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedTextEvent {
    #[serde(default)]
    t_start_ms: Option<f64>,
    #[serde(default)]
    d_duration_ms: Option<f64>,
    #[serde(default)]
    segs: Vec<TimedTextSeg>,
}

#[derive(Debug, Default, Deserialize)]
struct TimedTextSeg {
    #[serde(default)]
    utf8: String,
}

impl PlayerResponse {
    fn metadata(self, video_id: &str) -> Result<VideoMetadata> {
        let details = match self.video_details {
            Some(details) => details,
            None => {
                let reason = self
                    .playability_status
                    .and_then(|status| status.reason.or(status.status))
                    .unwrap_or_else(|| "no video details in player response".to_string());
                return Err(ScraperError::MalformedPage(format!("YouTube video {}: {}", video_id, reason)));
            }
        };

        let publish_date = self
            .microformat
            .and_then(|m| m.player_microformat_renderer)
            .and_then(|m| m.publish_date.or(m.upload_date))
            .map(|date| normalize_publish_date(&date));

        let thumbnails = details
            .thumbnail
            .and_then(|list| {
                list.thumbnails
                    .into_iter()
                    .filter(|t| !t.url.is_empty())
                    .max_by_key(|t| t.width.unwrap_or(0))
            })
            .map(|t| vec![t.url])
            .unwrap_or_default();

        Ok(VideoMetadata {
            title: details.title,
            author: details.author,
            length_seconds: details.length_seconds.and_then(|l| l.parse().ok()),
            keywords: details.keywords.unwrap_or_default(),
            view_count: details.view_count.and_then(|v| v.parse().ok()),
            publish_date,
            thumbnails,
        })
    }

    /// Pick a caption track: languages in order, manual tracks before generated ones
    fn select_track(&self, video_id: &str, languages: &[String]) -> Result<CaptionTrack> {
        let tracks = self
            .captions
            .as_ref()
            .and_then(|c| c.player_captions_tracklist_renderer.as_ref())
            .map(|t| t.caption_tracks.as_slice())
            .unwrap_or_default();
        let tracks: Vec<&CaptionTrack> = tracks.iter().filter(|t| !t.base_url.is_empty()).collect();

        if tracks.is_empty() {
            return Err(ScraperError::ProviderUnavailable(format!(
                "Transcripts are disabled for video {}",
                video_id
            )));
        }

        for language in languages {
            let matching = || tracks.iter().filter(|t| t.language_code.eq_ignore_ascii_case(language));
            if let Some(track) = matching().find(|t| !t.is_generated()).or_else(|| matching().next()) {
                return Ok((*track).clone());
            }
        }

        Err(ScraperError::ProviderUnavailable(format!(
            "No transcript found for video {} in languages {:?}",
            video_id, languages
        )))
    }
}

/// Locate and decode the player response embedded in a watch page
pub(crate) fn extract_player_response(html: &str) -> Result<PlayerResponse> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script")
        .map_err(|e| ScraperError::MalformedPage(format!("invalid script selector: {:?}", e)))?;

    for script in document.select(&selector) {
        let text: String = script.text().collect();
        if !text.contains(PLAYER_RESPONSE_MARKER) {
            continue;
        }

        if let Some(start) = player_response_pattern().find(&text).map(|m| m.end() - 1) {
            let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<PlayerResponse>();
            if let Some(parsed) = stream.next() {
                return parsed.map_err(|e| {
                    ScraperError::MalformedPage(format!("unreadable {}: {}", PLAYER_RESPONSE_MARKER, e))
                });
            }
        }
    }

    Err(ScraperError::MalformedPage(format!("{} not found in watch page", PLAYER_RESPONSE_MARKER)))
}

fn player_response_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ytInitialPlayerResponse\s*=\s*\{").expect("player response pattern is valid"))
}

/// Date-only values become midnight timestamps; full timestamps are kept as RFC 3339
fn normalize_publish_date(raw: &str) -> String {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return midnight.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|_| raw.to_string())
}

/// Convert a `json3` timed-text body into caption segments
pub(crate) fn parse_timed_text(body: &str) -> Result<Vec<CaptionSegment>> {
    let timed_text: TimedText = serde_json::from_str(body)?;

    Ok(timed_text
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            if text.trim().is_empty() {
                return None;
            }
            Some(CaptionSegment::new(
                event.t_start_ms.unwrap_or(0.0) / 1000.0,
                event.d_duration_ms.unwrap_or(0.0) / 1000.0,
                text.trim(),
            ))
        })
        .collect())
}

/// Transcript and metadata provider backed by the public watch page
#[derive(Clone)]
pub struct WatchPageClient {
    fetcher: RetryingFetcher,
}

impl WatchPageClient {
    pub fn new(fetcher: RetryingFetcher) -> Self {
        Self { fetcher }
    }

    fn watch_url(video_id: &str) -> String {
        format!("{}?v={}&hl=en", WATCH_URL, urlencoding::encode(video_id))
    }

    fn timed_text_url(base_url: &str) -> Result<String> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ScraperError::MalformedPage(format!("invalid caption track url {}: {}", base_url, e)))?;

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "fmt")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs).append_pair("fmt", "json3");

        Ok(url.to_string())
    }

    async fn player_response(&self, video_id: &str, proxy: &ProxyConfig) -> Result<PlayerResponse> {
        let html = self.fetcher.fetch(&Self::watch_url(video_id), proxy).await?;
        debug!("📄 Downloaded {} characters of watch page for {}", html.len(), video_id);
        extract_player_response(&html)
    }

    async fn track_segments(&self, video_id: &str, track: &CaptionTrack, proxy: &ProxyConfig) -> Result<Vec<CaptionSegment>> {
        debug!("Using caption track {} for {}", track.language_code, video_id);
        let body = self.fetcher.fetch(&Self::timed_text_url(&track.base_url)?, proxy).await?;
        parse_timed_text(&body)
    }
}

#[async_trait]
impl VideoSource for WatchPageClient {
    async fn fetch_video(&self, video_id: &str, languages: &[String], proxy: &ProxyConfig) -> Result<YouTubeVideo> {
        let response = self.player_response(video_id, proxy).await?;
        let track = response.select_track(video_id, languages);
        let metadata = response.metadata(video_id)?;

        let segments = match track {
            Ok(track) => self.track_segments(video_id, &track, proxy).await,
            Err(e) => Err(e),
        };

        Ok(YouTubeVideo { segments, metadata })
    }
}

#[async_trait]
impl TranscriptProvider for WatchPageClient {
    async fn fetch_segments(
        &self,
        video_id: &str,
        languages: &[String],
        proxy: &ProxyConfig,
    ) -> Result<Vec<CaptionSegment>> {
        let track = self.player_response(video_id, proxy).await?.select_track(video_id, languages)?;
        self.track_segments(video_id, &track, proxy).await
    }
}

#[async_trait]
impl MetadataProvider for WatchPageClient {
    async fn fetch_metadata(&self, video_id: &str, proxy: &ProxyConfig) -> Result<VideoMetadata> {
        self.player_response(video_id, proxy).await?.metadata(video_id)
    }
}
