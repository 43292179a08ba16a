use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use crate::models::CaptionSegment;

/// Header line that opens every WebVTT document
pub const VTT_HEADER: &str = "WEBVTT";

/// One WebVTT cue
#[derive(Debug, Clone, PartialEq)]
pub struct VttCue {
    /// Cue identifier
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl VttCue {
    /// Build a cue from a segment; `None` when the segment has no text
    pub fn from_segment(index: usize, segment: &CaptionSegment) -> Option<Self> {
        let text = VttFormatter::clean_text(&segment.text);
        if text.is_empty() {
            return None;
        }

        let start_ms = seconds_to_millis(segment.start);
        let end_ms = start_ms + seconds_to_millis(segment.duration);

        Some(Self {
            index,
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
            text,
        })
    }
}

impl fmt::Display for VttCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index,
            format_timestamp(self.start),
            format_timestamp(self.end),
            self.text
        )
    }
}

/// WebVTT formatting utilities
pub struct VttFormatter;

impl VttFormatter {
    /// Collapse embedded line breaks so a cue stays on one line
    pub fn clean_text(text: &str) -> String {
        text.replace("\r\n", " ")
            .replace(['\n', '\r'], " ")
            .trim()
            .to_string()
    }

    /// True when the body carries a WebVTT header
    pub fn is_vtt(body: &str) -> bool {
        body.trim_start().to_uppercase().starts_with(VTT_HEADER)
    }

    /// True for a cue timing line such as `00:00:01.000 --> 00:00:02.500`
    pub fn is_timing_line(line: &str) -> bool {
        timing_line_pattern().is_match(line)
    }
}

/// Encode segments as a WebVTT document.
///
/// Cue identifiers are the 1-based position among all input segments, so a
/// skipped empty segment leaves a gap in the numbering.
pub fn segments_to_vtt(segments: &[CaptionSegment]) -> String {
    let mut vtt = String::from(VTT_HEADER);
    vtt.push('\n');

    for cue in segments
        .iter()
        .enumerate()
        .filter_map(|(i, segment)| VttCue::from_segment(i + 1, segment))
    {
        vtt.push('\n');
        vtt.push_str(&cue.to_string());
    }

    vtt
}

/// Reduce a WebVTT document to its cue text joined by single spaces
pub fn vtt_to_plain_text(vtt: &str) -> String {
    let lines: Vec<&str> = vtt.lines().map(str::trim).collect();
    // Only the first non-blank line can be the header
    let header = lines.iter().position(|line| !line.is_empty()).filter(|&i| is_header_line(lines[i]));
    let mut text = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() || Some(i) == header || VttFormatter::is_timing_line(line) {
            continue;
        }

        // Integer cue identifiers sit directly above their timing line
        let next_is_timing = lines
            .get(i + 1)
            .map(|next| VttFormatter::is_timing_line(next))
            .unwrap_or(false);
        if next_is_timing && line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        text.push(*line);
    }

    text.join(" ")
}

/// Format a duration as `HH:MM:SS.mmm`; hours keep growing past 99
pub fn format_timestamp(duration: Duration) -> String {
    let total_millis = duration.as_millis();
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let seconds = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

fn seconds_to_millis(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

fn is_header_line(line: &str) -> bool {
    let upper = line.to_uppercase();
    upper == VTT_HEADER || upper.starts_with("WEBVTT ") || upper.starts_with("WEBVTT\t")
}

fn timing_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\d{2,}:)?\d{2}:\d{2}\.\d{3}\s+-->").expect("timing line pattern is valid")
    })
}
