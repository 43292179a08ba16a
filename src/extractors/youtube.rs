//! YouTube extractor: video id parsing, transcript and metadata composition

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};
use url::Url;

use super::youtube_watch::WatchPageClient;
use super::{ExtractOptions, PlatformExtractor};
use crate::http::{ProxyConfig, RetryingFetcher};
use crate::models::{CaptionSegment, Platform, VideoRecord};
use crate::transcription::segments_to_vtt;
use crate::{Result, ScraperError};

/// Language tried after the requested one
pub const FALLBACK_LANGUAGE: &str = "en";

/// Metadata for a single YouTube video
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub length_seconds: Option<u64>,
    pub keywords: Vec<String>,
    pub view_count: Option<u64>,
    /// ISO-8601 publish date
    pub publish_date: Option<String>,
    pub thumbnails: Vec<String>,
}

/// Source of timed caption segments.
///
/// Return `ScraperError::ProviderUnavailable` when captions are disabled or no
/// track matches the requested languages.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch_segments(
        &self,
        video_id: &str,
        languages: &[String],
        proxy: &ProxyConfig,
    ) -> Result<Vec<CaptionSegment>>;
}

/// Source of video metadata
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_metadata(&self, video_id: &str, proxy: &ProxyConfig) -> Result<VideoMetadata>;
}

/// Captions and metadata for one video, looked up together
#[derive(Debug)]
pub struct YouTubeVideo {
    /// Caption lookup result; a failure here does not fail the item
    pub segments: Result<Vec<CaptionSegment>>,
    pub metadata: VideoMetadata,
}

/// Source of both captions and metadata for a video.
///
/// An `Err` fails the whole item.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn fetch_video(&self, video_id: &str, languages: &[String], proxy: &ProxyConfig) -> Result<YouTubeVideo>;
}

/// Separate transcript and metadata providers, queried one after the other
struct SplitSource {
    transcripts: Arc<dyn TranscriptProvider>,
    metadata: Arc<dyn MetadataProvider>,
}

#[async_trait]
impl VideoSource for SplitSource {
    async fn fetch_video(&self, video_id: &str, languages: &[String], proxy: &ProxyConfig) -> Result<YouTubeVideo> {
        let segments = self.transcripts.fetch_segments(video_id, languages, proxy).await;
        let metadata = self.metadata.fetch_metadata(video_id, proxy).await?;
        Ok(YouTubeVideo { segments, metadata })
    }
}

/// Extract a video id from a YouTube URL or a bare id
pub fn parse_youtube_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    let parsed = Url::parse(input).ok().or_else(|| {
        // Allow scheme-less forms such as `youtu.be/<id>`
        if input.contains("youtu") {
            Url::parse(&format!("https://{}", input)).ok()
        } else {
            None
        }
    });

    if let Some(url) = parsed {
        let host = url.host_str().unwrap_or_default().to_lowercase();

        if host == "youtu.be" || host == "www.youtu.be" {
            return url
                .path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|id| !id.is_empty())
                .map(str::to_string);
        }

        if host.contains("youtube.com") {
            if let Some((_, id)) = url.query_pairs().find(|(key, value)| key == "v" && !value.is_empty()) {
                return Some(id.into_owned());
            }

            let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
            if let Some(position) = segments.iter().position(|segment| *segment == "embed") {
                return segments
                    .get(position + 1)
                    .filter(|id| !id.is_empty())
                    .map(|id| id.to_string());
            }
        }
    }

    if bare_id_pattern().is_match(input) {
        return Some(input.to_string());
    }

    None
}

fn bare_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").expect("bare id pattern is valid"))
}

/// YouTube platform extractor
#[derive(Clone)]
pub struct YouTubeExtractor {
    default_language: String,
    source: Arc<dyn VideoSource>,
}

impl YouTubeExtractor {
    pub fn new(
        default_language: impl Into<String>,
        transcripts: Arc<dyn TranscriptProvider>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self::with_source(default_language, Arc::new(SplitSource { transcripts, metadata }))
    }

    pub fn with_source(default_language: impl Into<String>, source: Arc<dyn VideoSource>) -> Self {
        Self {
            default_language: default_language.into(),
            source,
        }
    }

    /// Extractor backed by the public watch page, downloaded once per video
    pub fn with_watch_page(default_language: impl Into<String>, fetcher: RetryingFetcher) -> Self {
        Self::with_source(default_language, Arc::new(WatchPageClient::new(fetcher)))
    }

    /// Requested language first, then English
    fn languages(&self, requested: Option<&str>) -> Vec<String> {
        let primary = requested
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(self.default_language.as_str())
            .to_string();

        let mut languages = vec![primary];
        if !languages.iter().any(|l| l == FALLBACK_LANGUAGE) {
            languages.push(FALLBACK_LANGUAGE.to_string());
        }
        languages
    }

    fn usable_segments(video_id: &str, segments: Result<Vec<CaptionSegment>>) -> Vec<CaptionSegment> {
        match segments {
            Ok(segments) => segments,
            Err(ScraperError::ProviderUnavailable(reason)) => {
                warn!("No transcript available for {}: {}", video_id, reason);
                Vec::new()
            }
            Err(e) => {
                error!("Failed to fetch transcript for {}: {}", video_id, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl PlatformExtractor for YouTubeExtractor {
    async fn extract(&self, url: &str, options: &ExtractOptions) -> Result<VideoRecord> {
        info!("▶️ Processing YouTube URL: {}", url);

        let video_id = parse_youtube_video_id(url).ok_or_else(|| ScraperError::InvalidUrl(url.to_string()))?;

        let languages = self.languages(options.language.as_deref());
        debug!("Fetching YouTube video {} (languages={:?})", video_id, languages);

        let video = self.source.fetch_video(&video_id, &languages, &options.proxy).await?;
        let metadata = video.metadata;
        let segments = Self::usable_segments(&video_id, video.segments);
        let plain_text = segments
            .iter()
            .flat_map(|segment| segment.text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ");
        let transcript = if plain_text.is_empty() {
            None
        } else {
            Some(segments_to_vtt(&segments))
        };

        Ok(VideoRecord {
            transcript,
            transcript_plain_text: Some(plain_text).filter(|t| !t.is_empty()),
            video_id: Some(video_id),
            title: metadata.title,
            length_seconds: metadata.length_seconds.map(|l| l.to_string()),
            keywords: metadata.keywords,
            author: metadata.author,
            view_count: metadata.view_count.map(|v| v.to_string()),
            like_count: None,
            publish_date: metadata.publish_date,
            thumbnail: metadata.thumbnails,
            ..VideoRecord::new(Platform::YouTube, url)
        })
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }
}
