pub mod vtt;

pub use vtt::{format_timestamp, segments_to_vtt, vtt_to_plain_text, VttCue, VttFormatter};
