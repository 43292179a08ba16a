//! Platform extractors
//!
//! Each extractor turns a platform URL into a normalized [`VideoRecord`].
//! Raw platform payloads stay private to their extractor; only the record
//! shape is shared.

pub mod tiktok;
pub mod youtube;
pub mod youtube_watch;

pub use tiktok::TikTokExtractor;
pub use youtube::{
    parse_youtube_video_id, MetadataProvider, TranscriptProvider, VideoMetadata, VideoSource, YouTubeExtractor, YouTubeVideo,
};
pub use youtube_watch::WatchPageClient;

use async_trait::async_trait;

use crate::http::ProxyConfig;
use crate::models::{Platform, VideoRecord};
use crate::Result;

/// Per-item options resolved by the dispatcher
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Preferred transcript language
    pub language: Option<String>,
    pub proxy: ProxyConfig,
}

impl ExtractOptions {
    pub fn new(language: Option<String>, proxy: ProxyConfig) -> Self {
        Self { language, proxy }
    }
}

/// Trait for platform extractors
///
/// Expected conditions (no transcript, unreadable page state) come back as a
/// degraded record. Errors are for conditions the caller must report on the
/// item, such as an unparseable URL or an exhausted fetch.
#[async_trait]
pub trait PlatformExtractor: Send + Sync {
    async fn extract(&self, url: &str, options: &ExtractOptions) -> Result<VideoRecord>;
    fn platform(&self) -> Platform;
}
