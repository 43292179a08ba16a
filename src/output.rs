//! Output sinks: the aggregated JSON document and per-item caption files

use regex::Regex;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::models::VideoRecord;
use crate::Result;

/// Longest file name produced by [`safe_filename`]
pub const MAX_FILENAME_LENGTH: usize = 150;

fn unsafe_chars_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\-.]+").expect("filename pattern is valid"))
}

/// Make `name` safe to use as a single file name.
///
/// Runs of characters outside word characters, `-` and `.` become `_`. Names
/// over `max_length` characters are shortened from the stem so the extension
/// survives. An empty result becomes `file`.
pub fn safe_filename(name: &str, max_length: usize) -> String {
    let name = name.trim().replace(['/', '\\'], "_");
    let name = unsafe_chars_pattern().replace_all(&name, "_").into_owned();

    let name = if name.chars().count() > max_length {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && ext.chars().count() < max_length => {
                let keep = max_length - ext.chars().count() - 1;
                let stem: String = stem.chars().take(keep).collect();
                format!("{}.{}", stem, ext)
            }
            _ => name.chars().take(max_length).collect(),
        }
    } else {
        name
    };

    if name.is_empty() {
        "file".to_string()
    } else {
        name
    }
}

/// Write `value` as pretty JSON, replacing `path` atomically.
///
/// The document goes to a temporary file in the target directory first and is
/// renamed over `path` once complete. Missing parent directories are created.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    serde_json::to_writer_pretty(temp.as_file_mut(), value)?;
    temp.as_file_mut().write_all(b"\n")?;
    temp.as_file_mut().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    info!("💾 Wrote JSON output to {}", path.display());
    Ok(())
}

/// Base name shared by a record's `.vtt` and `.txt` files
fn caption_file_stem(record: &VideoRecord) -> String {
    let label = [record.title.as_deref(), record.video_id.as_deref()]
        .into_iter()
        .flatten()
        .find(|label| !label.trim().is_empty())
        .unwrap_or("video");
    format!("{}_{}", record.platform, label)
}

/// Write `.vtt` and `.txt` side files for every record that has them.
///
/// Returns the written paths in write order.
pub async fn write_caption_files(records: &[VideoRecord], dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::new();

    for record in records {
        let stem = caption_file_stem(record);
        let files = [
            ("vtt", record.transcript.as_deref()),
            ("txt", record.transcript_plain_text.as_deref()),
        ];

        for (extension, contents) in files {
            let Some(contents) = contents.filter(|c| !c.is_empty()) else {
                continue;
            };

            let path = dir.join(safe_filename(&format!("{}.{}", stem, extension), MAX_FILENAME_LENGTH));
            tokio::fs::write(&path, contents).await?;
            debug!("Wrote {} transcript to {}", extension, path.display());
            written.push(path);
        }
    }

    if written.is_empty() {
        info!("No transcript files written (no transcript fields present)");
    } else {
        info!("📝 Wrote {} transcript files into {}", written.len(), dir.display());
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use tempfile::TempDir;

    #[test]
    fn test_sanitizes_unsafe_characters() {
        assert_eq!(safe_filename("youtube_What is Rust?", 150), "youtube_What_is_Rust_");
        assert_eq!(safe_filename("a/b\\c.vtt", 150), "a_b_c.vtt");
        assert_eq!(safe_filename("   ", 150), "file");
        assert_eq!(safe_filename("???", 150), "_");
    }

    #[test]
    fn test_long_names_keep_extension() {
        let name = format!("tiktok_{}.vtt", "x".repeat(400));
        let safe = safe_filename(&name, MAX_FILENAME_LENGTH);

        assert_eq!(safe.chars().count(), MAX_FILENAME_LENGTH);
        assert!(safe.ends_with(".vtt"));
        assert!(safe.starts_with("tiktok_xxx"));
    }

    #[test]
    fn test_long_names_without_extension() {
        let safe = safe_filename(&"é".repeat(300), 150);
        assert_eq!(safe.chars().count(), 150);
    }

    #[test]
    fn test_atomic_json_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/out/results.json");
        let records = vec![VideoRecord::new(Platform::YouTube, "https://youtu.be/abc123XY")];

        write_json_atomic(&path, &records).unwrap();
        write_json_atomic(&path, &records).unwrap();

        let written: Vec<VideoRecord> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, records);
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_caption_files() {
        let temp_dir = TempDir::new().unwrap();

        let mut titled = VideoRecord::new(Platform::YouTube, "https://youtu.be/abc123XY");
        titled.title = Some("My Clip: part 1".to_string());
        titled.transcript = Some("WEBVTT\n".to_string());
        titled.transcript_plain_text = Some("hello".to_string());

        let mut by_id = VideoRecord::new(Platform::TikTok, "https://www.tiktok.com/@a/video/7");
        by_id.video_id = Some("7".to_string());
        by_id.transcript_plain_text = Some("only text".to_string());

        let mut anonymous = VideoRecord::new(Platform::TikTok, "https://www.tiktok.com/@a/video/8");
        anonymous.transcript = Some("WEBVTT\n".to_string());

        let empty = VideoRecord::new(Platform::YouTube, "https://youtu.be/none");

        let written = write_caption_files(&[titled, by_id, anonymous, empty], temp_dir.path())
            .await
            .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "youtube_My_Clip_part_1.vtt",
                "youtube_My_Clip_part_1.txt",
                "tiktok_7.txt",
                "tiktok_video.vtt"
            ]
        );
        assert_eq!(std::fs::read_to_string(&written[1]).unwrap(), "hello");
    }
}
