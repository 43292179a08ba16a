//! Retrying HTTP GET primitive shared by all platform extractors

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Browser-like User-Agent sent with every request
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

/// Per-scheme proxy settings. Null or empty entries are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub http: Option<String>,
    #[serde(default)]
    pub https: Option<String>,
}

impl ProxyConfig {
    pub fn new(http: Option<String>, https: Option<String>) -> Self {
        Self { http, https }
    }

    pub fn http(&self) -> Option<&str> {
        self.http.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn https(&self) -> Option<&str> {
        self.https.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.http().is_none() && self.https().is_none()
    }
}

/// Raised once every attempt of a fetch has failed
#[derive(thiserror::Error, Debug)]
#[error("GET {url} failed after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub cause: anyhow::Error,
}

/// A single GET request without retries
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, proxy: &ProxyConfig, timeout: Duration) -> anyhow::Result<String>;
}

/// Production transport backed by reqwest
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: Self::builder().build()?,
        })
    }

    fn builder() -> reqwest::ClientBuilder {
        Client::builder().user_agent(USER_AGENT)
    }

    /// Clients carry their proxies, so a proxied request gets its own client
    fn client_for(&self, proxy: &ProxyConfig) -> anyhow::Result<Client> {
        if proxy.is_empty() {
            return Ok(self.client.clone());
        }

        let mut builder = Self::builder();
        if let Some(http) = proxy.http() {
            builder = builder.proxy(reqwest::Proxy::http(http)?);
        }
        if let Some(https) = proxy.https() {
            builder = builder.proxy(reqwest::Proxy::https(https)?);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, proxy: &ProxyConfig, timeout: Duration) -> anyhow::Result<String> {
        let response = self
            .client_for(proxy)?
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// Retry policy for [`RetryingFetcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    /// Per-request timeout
    pub timeout: Duration,
    /// Maximum number of attempts. Zero still makes one attempt.
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds
    pub backoff_factor: f64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 3,
            backoff_factor: 1.5,
        }
    }
}

impl FetchPolicy {
    /// Delay after the given 1-based failed attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.backoff_factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// HTTP GET with bounded retries and exponential backoff
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: FetchPolicy,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: FetchPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch `url` as text. Every call goes to the network.
    pub async fn fetch(&self, url: &str, proxy: &ProxyConfig) -> Result<String, FetchError> {
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("HTTP GET {} (attempt {})", url, attempt);

            let cause = match self.transport.get(url, proxy, self.policy.timeout).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if attempt >= attempts {
                warn!("HTTP GET failed for {}: {} (attempt {}/{}, giving up)", url, cause, attempt, attempts);
                return Err(FetchError {
                    url: url.to_string(),
                    attempts: attempt,
                    cause,
                });
            }

            let delay = self.policy.backoff_delay(attempt);
            warn!(
                "HTTP GET failed for {}: {} (attempt {}/{}, sleeping {:.1}s)",
                url,
                cause,
                attempt,
                attempts,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
