//! Video Transcript Scraper
//!
//! Fetches transcripts and metadata for batches of YouTube and TikTok URLs and
//! normalizes them into a single record shape.

pub mod config;
pub mod extractors;
pub mod http;
pub mod models;
pub mod output;
pub mod processing;
pub mod transcription;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder, ConfigOrigin};
pub use crate::extractors::{ExtractOptions, PlatformExtractor, TikTokExtractor, YouTubeExtractor};
pub use crate::http::{FetchError, FetchPolicy, ProxyConfig, ReqwestTransport, RetryingFetcher, Transport};
pub use crate::models::{CaptionSegment, InputDescriptor, Platform, VideoRecord};
pub use crate::processing::{BatchSummary, Dispatcher, DispatchDefaults};
pub use crate::transcription::{segments_to_vtt, vtt_to_plain_text};

/// Result type for scraper operations
pub type Result<T> = std::result::Result<T, ScraperError>;

/// Error types for scraper operations
#[derive(thiserror::Error, Debug)]
pub enum ScraperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Could not parse YouTube video ID from URL: {0}")]
    InvalidUrl(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Malformed page: {0}")]
    MalformedPage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
