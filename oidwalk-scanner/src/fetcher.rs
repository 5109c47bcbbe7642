use crate::error::{Result, ScanError};
use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://oidref.com";

/// A fetched page for one identifier.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub identifier: String,
    pub url: String,
    pub body: String,
}

/// Source of registry pages. Retries and rate limiting belong to the
/// implementation, not to callers.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, identifier: &str) -> impl Future<Output = Result<RawDocument>> + Send;
}

/// Fetches `{base_url}/{identifier}` over HTTP.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, 10)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Url::parse(base_url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = Client::builder()
            .user_agent(concat!("oidwalk/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, identifier: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, identifier);
        Url::parse(&url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(url)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, identifier: &str) -> Result<RawDocument> {
        let url = self.url_for(identifier)?;
        debug!("Fetching {}", url);

        let start = Instant::now();
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!("Fetched {} in {:?} ({} bytes)", url, start.elapsed(), body.len());

        Ok(RawDocument {
            identifier: identifier.to_string(),
            url,
            body,
        })
    }
}
