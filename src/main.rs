use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use video_transcript_scraper::output::{write_caption_files, write_json_atomic};
use video_transcript_scraper::{Config, ConfigBuilder, ConfigOrigin, Dispatcher, InputDescriptor};

fn cli() -> Command {
    Command::new("transcript-scraper")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Fetch transcripts and metadata for YouTube and TikTok videos")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("JSON array of URL descriptors")
                .default_value("data/sample_input.json"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Where to write the JSON results")
                .default_value("data/sample_output.json"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Settings file (.json or .toml)")
                .default_value("config/settings.json"),
        )
        .arg(
            Arg::new("write-files")
                .long("write-files")
                .help("Also write .vtt and .txt files for each transcript")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("concurrency")
                .short('w')
                .long("concurrency")
                .value_name("NUM")
                .help("Number of parallel workers (overrides the settings file)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},{}={},warn",
            config.tracing_directive(),
            env!("CARGO_CRATE_NAME"),
            config.tracing_level()
        ))
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // Required args carry defaults
    let input = PathBuf::from(matches.get_one::<String>("input").context("missing --input")?);
    let output = PathBuf::from(matches.get_one::<String>("output").context("missing --output")?);
    let config_path = PathBuf::from(matches.get_one::<String>("config").context("missing --config")?);
    let write_files = matches.get_flag("write-files");
    let verbose = matches.get_flag("verbose");

    let (mut config, origin) = Config::load(&config_path)?;
    config.apply_env_overrides();
    let mut builder = ConfigBuilder::from_config(config);
    if let Some(concurrency) = matches.get_one::<usize>("concurrency") {
        builder = builder.with_concurrency(*concurrency);
    }
    if verbose {
        builder = builder.with_log_level("DEBUG");
    }
    let config = builder.build();

    init_tracing(&config);

    match &origin {
        ConfigOrigin::File(path) => info!("📄 Loaded configuration from: {}", path.display()),
        ConfigOrigin::Defaults(path) => warn!("Config file {} not found, using defaults", path.display()),
    }
    config.validate()?;
    debug!("{}", config.summary());

    info!("🚀 Transcript scraper starting...");
    info!("📁 Input: {}", input.display());
    info!("📂 Output: {}", output.display());
    info!("🔧 Workers: {}", config.concurrency);

    let raw_input = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read input file {}", input.display()))?;
    let descriptors = InputDescriptor::parse_batch(&raw_input)?;

    let dispatcher = Dispatcher::from_config(&config)?;
    let (records, summary) = dispatcher.run_with_summary(descriptors, config.concurrency).await;

    write_json_atomic(&output, &records)?;

    if write_files {
        write_caption_files(&records, &config.artifacts_dir).await?;
    }

    info!("✅ Successful: {}", summary.succeeded);
    info!("❌ Failed: {}", summary.failed);

    Ok(())
}
