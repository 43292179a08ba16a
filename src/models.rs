use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::http::ProxyConfig;
use crate::{Result, ScraperError};

/// Deserialize a field, reading any shape mismatch as `None`
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Source platform of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    TikTok,
    Unknown,
}

impl Platform {
    /// Guess the platform from substrings of the URL
    pub fn infer(url: &str) -> Self {
        let low = url.to_lowercase();
        if low.contains("tiktok.com") {
            Platform::TikTok
        } else if low.contains("youtube.com") || low.contains("youtu.be") {
            Platform::YouTube
        } else {
            Platform::Unknown
        }
    }

    /// Parse an explicit platform override. Unrecognized names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "youtube" => Platform::YouTube,
            "tiktok" => Platform::TikTok,
            _ => Platform::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized output unit, one per input descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub platform: Platform,
    pub url: Option<String>,
    /// WebVTT transcript
    pub transcript: Option<String>,
    pub transcript_plain_text: Option<String>,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub length_seconds: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub author: Option<String>,
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    /// ISO-8601 timestamp
    pub publish_date: Option<String>,
    #[serde(default)]
    pub thumbnail: Vec<String>,
    /// Present only when extraction failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Original descriptor, echoed back when it could not be dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Value>,
}

impl VideoRecord {
    /// Empty record carrying only platform and url
    pub fn new(platform: Platform, url: impl Into<String>) -> Self {
        Self {
            platform,
            url: Some(url.into()),
            transcript: None,
            transcript_plain_text: None,
            video_id: None,
            title: None,
            length_seconds: None,
            keywords: Vec::new(),
            author: None,
            view_count: None,
            like_count: None,
            publish_date: None,
            thumbnail: Vec::new(),
            error: None,
            item: None,
        }
    }

    /// Error record for an item that failed extraction
    pub fn failed(platform: Platform, url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(platform, url)
        }
    }

    /// Error record for a descriptor without a url
    pub fn missing_url(item: Value) -> Self {
        Self {
            url: None,
            error: Some("Missing url in item".to_string()),
            item: Some(item),
            ..Self::new(Platform::Unknown, String::new())
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One timed caption segment as returned by a transcript provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    /// Start offset in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
    pub text: String,
}

impl CaptionSegment {
    pub fn new(start: f64, duration: f64, text: impl Into<String>) -> Self {
        Self {
            start: start.max(0.0),
            duration: duration.max(0.0),
            text: text.into(),
        }
    }
}

/// One input request unit
///
/// Each field is read on its own, so a mistyped optional field is dropped
/// without losing the url.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputDescriptor {
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub platform: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub proxy: Option<ProxyConfig>,
    #[serde(skip)]
    raw: Value,
}

impl InputDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            raw: serde_json::json!({ "url": url }),
            url: Some(url),
            ..Self::default()
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        let platform = platform.into();
        if let Value::Object(map) = &mut self.raw {
            map.insert("platform".to_string(), Value::String(platform.clone()));
        }
        self.platform = Some(platform);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        if let Value::Object(map) = &mut self.raw {
            map.insert("language".to_string(), Value::String(language.clone()));
        }
        self.language = Some(language);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        if let (Value::Object(map), Ok(value)) = (&mut self.raw, serde_json::to_value(&proxy)) {
            map.insert("proxy".to_string(), value);
        }
        self.proxy = Some(proxy);
        self
    }

    /// Build a descriptor from one JSON array element.
    ///
    /// Elements that are not objects become a descriptor without a url, so
    /// they surface as item-level errors instead of aborting the batch.
    pub fn from_value(value: Value) -> Self {
        let mut descriptor: InputDescriptor = serde_json::from_value(value.clone()).unwrap_or_default();
        descriptor.raw = value;
        descriptor
    }

    /// Parse a JSON array of descriptors
    pub fn parse_batch(json: &str) -> Result<Vec<InputDescriptor>> {
        let document: Value = serde_json::from_str(json)?;
        match document {
            Value::Array(items) => Ok(items.into_iter().map(Self::from_value).collect()),
            _ => Err(ScraperError::Config(
                "Input JSON must be an array of URL descriptor objects.".to_string(),
            )),
        }
    }

    /// The url, treating an empty string as absent
    pub fn url(&self) -> Option<&str> {
        non_empty(self.url.as_deref())
    }

    pub fn platform_override(&self) -> Option<&str> {
        non_empty(self.platform.as_deref())
    }

    pub fn language_override(&self) -> Option<&str> {
        non_empty(self.language.as_deref())
    }

    /// The descriptor exactly as it appeared in the input
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_inference() {
        assert_eq!(Platform::infer("https://www.tiktok.com/@a/video/1"), Platform::TikTok);
        assert_eq!(Platform::infer("https://youtu.be/abc123"), Platform::YouTube);
        assert_eq!(Platform::infer("https://WWW.YOUTUBE.COM/watch?v=x"), Platform::YouTube);
        assert_eq!(Platform::infer("https://vimeo.com/1"), Platform::Unknown);
    }

    #[test]
    fn test_platform_override_names() {
        assert_eq!(Platform::from_name("YouTube"), Platform::YouTube);
        assert_eq!(Platform::from_name(" tiktok "), Platform::TikTok);
        assert_eq!(Platform::from_name("carrierpigeon"), Platform::Unknown);
    }

    #[test]
    fn test_record_serializes_camel_case_and_hides_absent_error() {
        let record = VideoRecord::new(Platform::TikTok, "https://www.tiktok.com/@a/video/1");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["platform"], "tiktok");
        assert!(json.get("transcriptPlainText").unwrap().is_null());
        assert!(json.get("lengthSeconds").unwrap().is_null());
        assert_eq!(json["keywords"], serde_json::json!([]));
        assert!(json.get("error").is_none());
        assert!(json.get("item").is_none());
    }

    #[test]
    fn test_missing_url_record_echoes_item() {
        let item = serde_json::json!({ "platform": "youtube" });
        let record = VideoRecord::missing_url(item.clone());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["error"], "Missing url in item");
        assert_eq!(json["item"], item);
        assert!(json["url"].is_null());
    }

    #[test]
    fn test_parse_batch_tolerates_odd_elements() {
        let batch = InputDescriptor::parse_batch(
            r#"[{"url": "https://youtu.be/abc123"}, "not-an-object", {"url": 42}, {"url": ""}]"#,
        )
        .unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].url(), Some("https://youtu.be/abc123"));
        assert_eq!(batch[1].url(), None);
        assert_eq!(batch[1].raw(), &serde_json::json!("not-an-object"));
        assert_eq!(batch[2].url(), None);
        assert_eq!(batch[3].url(), None);
    }

    #[test]
    fn test_mistyped_optional_fields_keep_url() {
        let batch = InputDescriptor::parse_batch(
            r#"[
                {"url": "https://youtu.be/abc123XY", "platform": 7},
                {"url": "https://youtu.be/abc123XY", "proxy": "http://p:1"},
                {"url": "https://youtu.be/abc123XY", "language": ["de"], "proxy": {"https": "http://p:2"}}
            ]"#,
        )
        .unwrap();

        for descriptor in &batch {
            assert_eq!(descriptor.url(), Some("https://youtu.be/abc123XY"));
        }
        assert_eq!(batch[0].platform_override(), None);
        assert!(batch[1].proxy.is_none());
        assert_eq!(batch[1].raw()["proxy"], "http://p:1");
        assert_eq!(batch[2].language_override(), None);
        assert_eq!(batch[2].proxy.as_ref().and_then(|p| p.https()), Some("http://p:2"));
    }

    #[test]
    fn test_parse_batch_rejects_non_array() {
        let err = InputDescriptor::parse_batch(r#"{"url": "x"}"#).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_descriptor_builders_keep_raw_in_sync() {
        let descriptor = InputDescriptor::new("https://youtu.be/abc123")
            .with_platform("youtube")
            .with_language("de");

        assert_eq!(descriptor.raw()["platform"], "youtube");
        assert_eq!(descriptor.raw()["language"], "de");
        assert_eq!(descriptor.language_override(), Some("de"));
    }
}
