//! TikTok extractor
//!
//! Reads the hydration state embedded in the video page. Every lookup is
//! optional: a field that is missing or has an unexpected type reads as absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{ExtractOptions, PlatformExtractor};
use crate::http::{ProxyConfig, RetryingFetcher};
use crate::models::{lenient, CaptionSegment, Platform, VideoRecord};
use crate::transcription::{segments_to_vtt, vtt_to_plain_text, VttFormatter};
use crate::Result;

const SIGI_STATE_ID: &str = "SIGI_STATE";
const UNIVERSAL_STATE_ID: &str = "__UNIVERSAL_DATA_FOR_REHYDRATION__";
const UNIVERSAL_ITEM_POINTER: &str = "/__DEFAULT_SCOPE__/webapp.video-detail/itemInfo/itemStruct";

/// End of the description cue used when no subtitle track is usable
const FALLBACK_CUE_SECONDS: f64 = 3599.0;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SigiState {
    #[serde(default, deserialize_with = "lenient")]
    item_module: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient")]
    user_module: Option<UserModule>,
}

#[derive(Debug, Default, Deserialize)]
struct UserModule {
    #[serde(default, deserialize_with = "lenient")]
    users: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TikTokUser {
    #[serde(default, deserialize_with = "lenient")]
    nickname: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    unique_id: Option<String>,
}

impl TikTokUser {
    fn display_name(&self) -> Option<String> {
        self.nickname
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.unique_id.clone().filter(|u| !u.is_empty()))
    }
}

/// `author` is an id into `UserModule.users` in the legacy layout and an
/// inline profile in the newer one
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AuthorRef {
    Id(String),
    Profile(TikTokUser),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TikTokItem {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    desc: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    author: Option<AuthorRef>,
    #[serde(default, deserialize_with = "lenient")]
    video: Option<TikTokVideo>,
    #[serde(default, deserialize_with = "lenient")]
    stats: Option<TikTokStats>,
    #[serde(default, deserialize_with = "lenient")]
    text_extra: Option<Vec<TextExtra>>,
    #[serde(default, deserialize_with = "lenient")]
    create_time: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TikTokVideo {
    #[serde(default, deserialize_with = "lenient")]
    duration: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    duration_time: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    subtitle_infos: Option<Vec<SubtitleInfo>>,
    #[serde(default, deserialize_with = "lenient")]
    subtitle_info: Option<Vec<SubtitleInfo>>,
    #[serde(default, deserialize_with = "lenient")]
    subtitles: Option<Vec<SubtitleInfo>>,
    #[serde(default, deserialize_with = "lenient")]
    cover: Option<OneOrMany>,
    #[serde(default, deserialize_with = "lenient")]
    origin_cover: Option<OneOrMany>,
    #[serde(default, deserialize_with = "lenient")]
    dynamic_cover: Option<OneOrMany>,
    #[serde(default, deserialize_with = "lenient")]
    share_cover: Option<OneOrMany>,
}

impl TikTokVideo {
    /// First non-empty subtitle list, in lookup order
    fn subtitle_entries(&self) -> &[SubtitleInfo] {
        [&self.subtitle_infos, &self.subtitle_info, &self.subtitles]
            .into_iter()
            .flatten()
            .find(|entries| !entries.is_empty())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn length_seconds(&self) -> Option<String> {
        self.duration
            .as_ref()
            .and_then(integer_string)
            .or_else(|| self.duration_time.as_ref().and_then(integer_string))
    }

    fn thumbnails(&self) -> Vec<String> {
        [&self.cover, &self.origin_cover, &self.dynamic_cover, &self.share_cover]
            .into_iter()
            .flatten()
            .flat_map(|covers| covers.to_vec())
            .filter(|url| !url.is_empty())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubtitleInfo {
    #[serde(rename = "Url", default, deserialize_with = "lenient")]
    upper_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    url: Option<String>,
    #[serde(rename = "subtitleUrl", default, deserialize_with = "lenient")]
    subtitle_url: Option<String>,
}

impl SubtitleInfo {
    fn url(&self) -> Option<&str> {
        [&self.upper_url, &self.url, &self.subtitle_url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(url) => vec![url.clone()],
            OneOrMany::Many(urls) => urls.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TikTokStats {
    #[serde(default, deserialize_with = "lenient")]
    play_count: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    digg_count: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextExtra {
    #[serde(default, deserialize_with = "lenient")]
    hashtag_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    hashtag_name_raw: Option<String>,
}

impl TextExtra {
    fn tag(&self) -> Option<String> {
        self.hashtag_name
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.hashtag_name_raw.clone().filter(|t| !t.is_empty()))
    }
}

/// A located video item plus the author name it resolves to
struct PageItem {
    item: TikTokItem,
    author: Option<String>,
}

/// Text of the `<script id=...>` element, if present
fn script_text(document: &Html, id: &str) -> Option<String> {
    let selector = Selector::parse(&format!("script#{}", id)).ok()?;
    document
        .select(&selector)
        .next()
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
}

/// Locate the video item in a TikTok page
fn find_item(html: &str) -> Option<PageItem> {
    let document = Html::parse_document(html);

    if let Some(text) = script_text(&document, SIGI_STATE_ID) {
        let state: SigiState = match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to decode {} JSON: {}", SIGI_STATE_ID, e);
                return None;
            }
        };
        return item_from_sigi(state);
    }

    let text = script_text(&document, UNIVERSAL_STATE_ID)?;
    let state: Value = match serde_json::from_str(&text) {
        Ok(state) => state,
        Err(e) => {
            warn!("Failed to decode {} JSON: {}", UNIVERSAL_STATE_ID, e);
            return None;
        }
    };
    let item: TikTokItem = serde_json::from_value(state.pointer(UNIVERSAL_ITEM_POINTER)?.clone()).ok()?;
    let author = match &item.author {
        Some(AuthorRef::Profile(profile)) => profile.display_name(),
        Some(AuthorRef::Id(id)) => Some(id.clone()),
        None => None,
    };
    Some(PageItem { item, author })
}

fn item_from_sigi(state: SigiState) -> Option<PageItem> {
    let raw_item = state.item_module?.into_iter().map(|(_, v)| v).find(Value::is_object)?;
    let item: TikTokItem = serde_json::from_value(raw_item).ok()?;

    let author = match &item.author {
        Some(AuthorRef::Id(id)) if !id.is_empty() => {
            let user = state
                .user_module
                .and_then(|module| module.users)
                .and_then(|mut users| users.remove(id))
                .and_then(|user| serde_json::from_value::<TikTokUser>(user).ok());
            Some(user.and_then(|u| u.display_name()).unwrap_or_else(|| id.clone()))
        }
        Some(AuthorRef::Profile(profile)) => profile.display_name(),
        _ => None,
    };

    Some(PageItem { item, author })
}

/// Strings pass through, numbers are printed
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer rendering of a numeric or numeric-string value
fn integer_string(value: &Value) -> Option<String> {
    let text = scalar_to_string(value)?;
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n.to_string());
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| (f.trunc() as i64).to_string())
}

fn publish_date(create_time: &Value) -> Option<String> {
    let seconds = integer_string(create_time)?.parse::<i64>().ok()?;
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|dt| dt.to_rfc3339())
}

fn segment_from_value(value: &Value) -> Option<CaptionSegment> {
    let entry = value.as_object()?;
    let number = |key: &str| {
        entry
            .get(key)
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok())))
    };

    Some(CaptionSegment::new(
        number("start").unwrap_or(0.0),
        number("duration").unwrap_or(0.0),
        entry.get("text").and_then(Value::as_str).unwrap_or_default(),
    ))
}

/// A WebVTT body is kept as-is; a JSON segment list is re-encoded
fn decode_subtitle_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if VttFormatter::is_vtt(body) {
        return Some(format!("{}\n", body));
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(entries)) => {
            let segments: Vec<CaptionSegment> = entries.iter().filter_map(segment_from_value).collect();
            Some(segments_to_vtt(&segments))
        }
        _ => None,
    }
}

/// TikTok platform extractor
#[derive(Clone)]
pub struct TikTokExtractor {
    fetcher: RetryingFetcher,
}

impl TikTokExtractor {
    pub fn new(fetcher: RetryingFetcher) -> Self {
        Self { fetcher }
    }

    async fn fetch_transcript(&self, video: &TikTokVideo, proxy: &ProxyConfig) -> Option<String> {
        for url in video.subtitle_entries().iter().filter_map(SubtitleInfo::url) {
            let body = match self.fetcher.fetch(url, proxy).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to download TikTok subtitle from {}: {}", url, e);
                    continue;
                }
            };

            match decode_subtitle_body(&body) {
                Some(vtt) => return Some(vtt),
                None => warn!("Unrecognized TikTok subtitle body from {}", url),
            }
        }
        None
    }

    fn record_from_item(url: &str, page: PageItem, transcript: Option<String>) -> VideoRecord {
        let PageItem { item, author } = page;
        let video = item.video.unwrap_or_default();
        let stats = item.stats.unwrap_or_default();

        let transcript_plain_text = transcript
            .as_deref()
            .map(vtt_to_plain_text)
            .filter(|text| !text.is_empty());

        VideoRecord {
            transcript,
            transcript_plain_text,
            video_id: item.id.as_ref().and_then(scalar_to_string),
            title: item.desc,
            length_seconds: video.length_seconds(),
            keywords: item
                .text_extra
                .unwrap_or_default()
                .iter()
                .filter_map(TextExtra::tag)
                .collect(),
            author,
            view_count: stats.play_count.as_ref().and_then(scalar_to_string),
            like_count: stats.digg_count.as_ref().and_then(scalar_to_string),
            publish_date: item.create_time.as_ref().and_then(publish_date),
            thumbnail: video.thumbnails(),
            ..VideoRecord::new(Platform::TikTok, url)
        }
    }
}

#[async_trait]
impl PlatformExtractor for TikTokExtractor {
    async fn extract(&self, url: &str, options: &ExtractOptions) -> Result<VideoRecord> {
        info!("🎵 Processing TikTok URL: {}", url);

        let html = self.fetcher.fetch(url, &options.proxy).await?;

        let page = match find_item(&html) {
            Some(page) => page,
            None => {
                warn!("Could not read TikTok video state for {}", url);
                return Ok(VideoRecord::new(Platform::TikTok, url));
            }
        };

        let video = page.item.video.as_ref();
        let mut transcript = match video {
            Some(video) => self.fetch_transcript(video, &options.proxy).await,
            None => None,
        };

        if transcript.is_none() {
            let description = page.item.desc.as_deref().map(str::trim).unwrap_or_default();
            if !description.is_empty() {
                debug!("Using description as transcript for {}", url);
                transcript = Some(segments_to_vtt(&[CaptionSegment::new(
                    0.0,
                    FALLBACK_CUE_SECONDS,
                    description,
                )]));
            }
        }

        Ok(Self::record_from_item(url, page, transcript))
    }

    fn platform(&self) -> Platform {
        Platform::TikTok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{instant_policy, StaticTransport};
    use std::sync::Arc;

    const PAGE_URL: &str = "https://www.tiktok.com/@creator/video/7300000000000000001";
    const SUBTITLE_URL: &str = "https://v16.tiktokcdn.com/subtitle/en.vtt";

    fn sigi_page(state: &str) -> String {
        format!(
            r#"<html><body><script id="SIGI_STATE" type="application/json">{}</script></body></html>"#,
            state
        )
    }

    fn extractor(transport: StaticTransport) -> (TikTokExtractor, Arc<StaticTransport>) {
        let transport = Arc::new(transport);
        let fetcher = RetryingFetcher::new(transport.clone(), instant_policy(1));
        (TikTokExtractor::new(fetcher), transport)
    }

    fn full_state() -> String {
        format!(
            r#"{{
                "ItemModule": {{
                    "7300000000000000001": {{
                        "id": "7300000000000000001",
                        "desc": "learning rust #rust #async",
                        "author": "creator",
                        "createTime": "1700000000",
                        "video": {{
                            "duration": 15,
                            "cover": "https://p16.tiktokcdn.com/cover.jpg",
                            "originCover": ["https://p16.tiktokcdn.com/origin.jpg"],
                            "subtitleInfos": [
                                {{"Url": "https://v16.tiktokcdn.com/subtitle/broken"}},
                                {{"Url": "{}"}}
                            ]
                        }},
                        "stats": {{"playCount": 1000, "diggCount": "55"}},
                        "textExtra": [{{"hashtagName": "rust"}}, {{"hashtagNameRaw": "async"}}, {{"hashtagName": ""}}]
                    }},
                    "7300000000000000002": {{"id": "second"}}
                }},
                "UserModule": {{"users": {{"creator": {{"uniqueId": "creator", "nickname": "The Creator"}}}}}}
            }}"#,
            SUBTITLE_URL
        )
    }

    #[tokio::test]
    async fn test_page_without_state_is_degraded_record() {
        let (extractor, _) = extractor(StaticTransport::default().with_page(PAGE_URL, "<html><body>nothing</body></html>"));

        let record = extractor.extract(PAGE_URL, &ExtractOptions::default()).await.unwrap();

        assert_eq!(record, VideoRecord::new(Platform::TikTok, PAGE_URL));
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_malformed_state_is_degraded_record() {
        let (extractor, _) = extractor(StaticTransport::default().with_page(PAGE_URL, &sigi_page("{not json")));
        let record = extractor.extract(PAGE_URL, &ExtractOptions::default()).await.unwrap();
        assert_eq!(record.video_id, None);
        assert!(record.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let (extractor, _) = extractor(StaticTransport::default());
        assert!(extractor.extract(PAGE_URL, &ExtractOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_extracts_full_item() {
        let subtitle = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nhello from tiktok\n";
        let (extractor, transport) = extractor(
            StaticTransport::default()
                .with_page(PAGE_URL, &sigi_page(&full_state()))
                .with_page("https://v16.tiktokcdn.com/subtitle/broken", "<xml/>")
                .with_page(SUBTITLE_URL, subtitle),
        );

        let record = extractor.extract(PAGE_URL, &ExtractOptions::default()).await.unwrap();

        assert_eq!(record.video_id.as_deref(), Some("7300000000000000001"));
        assert_eq!(record.title.as_deref(), Some("learning rust #rust #async"));
        assert_eq!(record.author.as_deref(), Some("The Creator"));
        assert_eq!(record.length_seconds.as_deref(), Some("15"));
        assert_eq!(record.view_count.as_deref(), Some("1000"));
        assert_eq!(record.like_count.as_deref(), Some("55"));
        assert_eq!(record.keywords, vec!["rust", "async"]);
        assert_eq!(record.publish_date.as_deref(), Some("2023-11-14T22:13:20+00:00"));
        assert_eq!(
            record.thumbnail,
            vec!["https://p16.tiktokcdn.com/cover.jpg", "https://p16.tiktokcdn.com/origin.jpg"]
        );
        assert_eq!(record.transcript.as_deref(), Some(subtitle));
        assert_eq!(record.transcript_plain_text.as_deref(), Some("hello from tiktok"));
        assert_eq!(transport.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_description_fallback_cue() {
        let state = r#"{"ItemModule": {"1": {"id": 1, "desc": "  just a caption  ", "author": "ghost"}}}"#;
        let (extractor, _) = extractor(StaticTransport::default().with_page(PAGE_URL, &sigi_page(state)));

        let record = extractor.extract(PAGE_URL, &ExtractOptions::default()).await.unwrap();

        assert_eq!(
            record.transcript.as_deref(),
            Some("WEBVTT\n\n1\n00:00:00.000 --> 00:59:59.000\njust a caption\n")
        );
        assert_eq!(record.transcript_plain_text.as_deref(), Some("just a caption"));
        assert_eq!(record.video_id.as_deref(), Some("1"));
        // Unknown author ids stay as-is
        assert_eq!(record.author.as_deref(), Some("ghost"));
    }

    #[tokio::test]
    async fn test_universal_layout() {
        let page = r#"<html><script id="__UNIVERSAL_DATA_FOR_REHYDRATION__" type="application/json">
            {"__DEFAULT_SCOPE__": {"webapp.video-detail": {"itemInfo": {"itemStruct": {
                "id": "42", "desc": "new layout",
                "author": {"uniqueId": "handle", "nickname": ""},
                "video": {"durationTime": "9.8"},
                "stats": {"playCount": 7}
            }}}}}
        </script></html>"#;
        let (extractor, _) = extractor(StaticTransport::default().with_page(PAGE_URL, page));

        let record = extractor.extract(PAGE_URL, &ExtractOptions::default()).await.unwrap();

        assert_eq!(record.video_id.as_deref(), Some("42"));
        assert_eq!(record.author.as_deref(), Some("handle"));
        assert_eq!(record.length_seconds.as_deref(), Some("9"));
        assert_eq!(record.view_count.as_deref(), Some("7"));
    }

    #[test]
    fn test_mistyped_fields_read_as_absent() {
        let state = r#"{"ItemModule": {"1": {"id": "1", "desc": 5, "video": "nope", "stats": [], "textExtra": {}}}}"#;
        let page = find_item(&sigi_page(state)).unwrap();
        let record = TikTokExtractor::record_from_item(PAGE_URL, page, None);

        assert_eq!(record.video_id.as_deref(), Some("1"));
        assert_eq!(record.title, None);
        assert_eq!(record.length_seconds, None);
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn test_item_module_without_objects() {
        assert!(find_item(&sigi_page(r#"{"ItemModule": {"1": "x"}}"#)).is_none());
        assert!(find_item(&sigi_page(r#"{"ItemModule": []}"#)).is_none());
    }

    #[test]
    fn test_subtitle_body_decoding() {
        let json = r#"[{"start": 0, "duration": 1.5, "text": "json cue"}]"#;
        assert_eq!(
            decode_subtitle_body(json).as_deref(),
            Some("WEBVTT\n\n1\n00:00:00.000 --> 00:00:01.500\njson cue\n")
        );
        assert_eq!(decode_subtitle_body("  WEBVTT\n\ncue").as_deref(), Some("WEBVTT\n\ncue\n"));
        assert_eq!(decode_subtitle_body("{\"not\": \"a list\"}"), None);
        assert_eq!(decode_subtitle_body("   "), None);
    }
}
