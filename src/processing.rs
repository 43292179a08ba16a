use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::extractors::{ExtractOptions, PlatformExtractor, TikTokExtractor, YouTubeExtractor};
use crate::http::{ProxyConfig, ReqwestTransport, RetryingFetcher, Transport};
use crate::models::{InputDescriptor, Platform, VideoRecord};
use crate::Result;

/// Fallbacks applied to descriptors without their own overrides
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchDefaults {
    pub language: String,
    pub proxy: ProxyConfig,
}

impl Default for DispatchDefaults {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// Counts for a finished batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn from_records(records: &[VideoRecord], elapsed: Duration) -> Self {
        let failed = records.iter().filter(|r| r.is_error()).count();
        Self {
            total: records.len(),
            succeeded: records.len() - failed,
            failed,
            elapsed,
        }
    }
}

/// Result of one worker task
#[derive(Debug)]
pub enum ItemOutcome {
    Extracted(VideoRecord),
    Failed {
        url: String,
        platform: Platform,
        error: String,
    },
}

impl ItemOutcome {
    pub fn into_record(self) -> VideoRecord {
        match self {
            ItemOutcome::Extracted(record) => record,
            ItemOutcome::Failed { url, platform, error } => VideoRecord::failed(platform, url, error),
        }
    }
}

/// A descriptor resolved to its extractor and options
struct Job {
    url: String,
    platform: Platform,
    extractor: Arc<dyn PlatformExtractor>,
    options: ExtractOptions,
}

impl Job {
    async fn execute(self) -> ItemOutcome {
        let Job {
            url,
            platform,
            extractor,
            options,
        } = self;

        let result = AssertUnwindSafe(extractor.extract(&url, &options)).catch_unwind().await;
        match result {
            Ok(Ok(record)) => ItemOutcome::Extracted(record),
            Ok(Err(e)) => ItemOutcome::Failed {
                error: e.to_string(),
                url,
                platform,
            },
            Err(payload) => ItemOutcome::Failed {
                error: format!("Extractor panicked: {}", panic_message(payload.as_ref())),
                url,
                platform,
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Routes descriptors to platform extractors over a bounded worker pool
#[derive(Clone)]
pub struct Dispatcher {
    youtube: Arc<dyn PlatformExtractor>,
    tiktok: Arc<dyn PlatformExtractor>,
    defaults: DispatchDefaults,
}

impl Dispatcher {
    pub fn new(
        youtube: Arc<dyn PlatformExtractor>,
        tiktok: Arc<dyn PlatformExtractor>,
        defaults: DispatchDefaults,
    ) -> Self {
        Self {
            youtube,
            tiktok,
            defaults,
        }
    }

    /// Production dispatcher using reqwest for every request
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Dispatcher with both extractors sharing one fetcher over `transport`
    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let fetcher = RetryingFetcher::new(transport, config.fetch_policy());
        let youtube = Arc::new(YouTubeExtractor::with_watch_page(
            config.default_youtube_language.clone(),
            fetcher.clone(),
        ));
        let tiktok = Arc::new(TikTokExtractor::new(fetcher));

        Self::new(youtube, tiktok, config.dispatch_defaults())
    }

    pub fn defaults(&self) -> &DispatchDefaults {
        &self.defaults
    }

    /// Resolve a descriptor, or produce its error record without dispatching
    fn resolve(&self, descriptor: &InputDescriptor) -> std::result::Result<Job, VideoRecord> {
        let url = match descriptor.url() {
            Some(url) => url.to_string(),
            None => return Err(VideoRecord::missing_url(descriptor.raw().clone())),
        };

        let platform = descriptor
            .platform_override()
            .map(Platform::from_name)
            .unwrap_or_else(|| Platform::infer(&url));

        let extractor = match platform {
            Platform::YouTube => Arc::clone(&self.youtube),
            Platform::TikTok => Arc::clone(&self.tiktok),
            Platform::Unknown => {
                let message = format!("Unsupported or unknown platform for URL: {}", url);
                return Err(VideoRecord::failed(platform, url, message));
            }
        };

        let language = descriptor
            .language_override()
            .unwrap_or(self.defaults.language.as_str())
            .to_string();
        // An empty proxy object counts as absent
        let proxy = descriptor
            .proxy
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.defaults.proxy.clone());

        Ok(Job {
            url,
            platform,
            extractor,
            options: ExtractOptions::new(Some(language), proxy),
        })
    }

    /// Process every descriptor; records come back in completion order
    pub async fn run(&self, descriptors: Vec<InputDescriptor>, concurrency: usize) -> Vec<VideoRecord> {
        let concurrency = concurrency.max(1);
        let total = descriptors.len();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel(concurrency);
        let mut records = Vec::with_capacity(total);

        info!("🚀 Dispatching {} items with {} workers", total, concurrency);

        for (index, descriptor) in descriptors.iter().enumerate() {
            let job = match self.resolve(descriptor) {
                Ok(job) => job,
                Err(record) => {
                    warn!(
                        "❌ Skipped item {}/{}: {}",
                        index + 1,
                        total,
                        record.error.as_deref().unwrap_or("invalid item")
                    );
                    records.push(record);
                    continue;
                }
            };

            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);

            tokio::spawn(async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => {
                        debug!("📹 Processing item {}/{}: {}", index + 1, total, job.url);
                        job.execute().await
                    }
                    Err(e) => ItemOutcome::Failed {
                        error: format!("worker pool closed: {}", e),
                        url: job.url,
                        platform: job.platform,
                    },
                };

                if let Err(e) = tx.send(outcome).await {
                    error!("Failed to send result: {}", e);
                }
            });
        }

        // Drop the original sender to close the channel when all tasks complete
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            match &outcome {
                ItemOutcome::Extracted(record) => {
                    info!("✅ Completed: {}", record.url.as_deref().unwrap_or_default());
                }
                ItemOutcome::Failed { url, error, .. } => {
                    warn!("❌ Failed: {} - {}", url, error);
                }
            }
            records.push(outcome.into_record());
        }

        records
    }

    /// [`Dispatcher::run`] plus counts and elapsed time
    pub async fn run_with_summary(
        &self,
        descriptors: Vec<InputDescriptor>,
        concurrency: usize,
    ) -> (Vec<VideoRecord>, BatchSummary) {
        let start_time = Instant::now();
        let records = self.run(descriptors, concurrency).await;
        let summary = BatchSummary::from_records(&records, start_time.elapsed());

        info!(
            "🎉 Batch finished: {} total, {} succeeded, {} failed in {:.2}s",
            summary.total,
            summary.succeeded,
            summary.failed,
            summary.elapsed.as_secs_f64()
        );

        (records, summary)
    }
}
