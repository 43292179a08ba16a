use criterion::{black_box, criterion_group, criterion_main, Criterion};
use video_transcript_scraper::output::safe_filename;
use video_transcript_scraper::{segments_to_vtt, vtt_to_plain_text, CaptionSegment, Config};

fn segments(count: usize) -> Vec<CaptionSegment> {
    (0..count)
        .map(|i| {
            CaptionSegment::new(
                i as f64 * 2.5,
                2.5,
                format!("caption segment {} with a few words of spoken text", i + 1),
            )
        })
        .collect()
}

fn bench_vtt_encoding(c: &mut Criterion) {
    let short = segments(10);
    c.bench_function("vtt_encode_short_clip", |b| b.iter(|| black_box(segments_to_vtt(black_box(&short)))));

    // Roughly an hour of auto-generated captions
    let long = segments(1500);
    c.bench_function("vtt_encode_long_video", |b| b.iter(|| black_box(segments_to_vtt(black_box(&long)))));
}

fn bench_plain_text(c: &mut Criterion) {
    let vtt = segments_to_vtt(&segments(1500));
    c.bench_function("vtt_to_plain_text_long_video", |b| {
        b.iter(|| black_box(vtt_to_plain_text(black_box(&vtt))))
    });
}

fn bench_misc(c: &mut Criterion) {
    let title = format!("youtube_{}.vtt", "Learning Rust: ownership & borrowing! ".repeat(8));
    c.bench_function("safe_filename_long_title", |b| b.iter(|| black_box(safe_filename(black_box(&title), 150))));

    c.bench_function("config_defaults", |b| b.iter(|| black_box(Config::default().summary())));
}

criterion_group!(benches, bench_vtt_encoding, bench_plain_text, bench_misc);
criterion_main!(benches);
