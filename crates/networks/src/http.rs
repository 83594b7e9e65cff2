use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use sitemirror_core::config::HttpConfig;
use sitemirror_core::{FetchConfig, FetchResponse, Fetcher, MirrorError};

/// Plain HTTP(S) driver, optionally routed through one proxy
/// (`http://`, `https://` or `socks5h://`).
pub struct HttpDriver {
    client: reqwest::Client,
    max_concurrency: usize,
    min_delay: Duration,
    request_timeout: Duration,
}

impl HttpDriver {
    pub fn new(config: &HttpConfig) -> Result<Self, MirrorError> {
        let request_timeout = Duration::from_secs(config.request_timeout_seconds);

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(request_timeout)
            .read_timeout(request_timeout)
            .pool_max_idle_per_host(4)
            .redirect(reqwest::redirect::Policy::limited(10));

        builder = match &config.proxy {
            Some(addr) => {
                let proxy = reqwest::Proxy::all(addr.as_str())
                    .map_err(|e| MirrorError::Proxy(format!("{addr}: {e}")))?;
                builder.proxy(proxy)
            }
            // Only the configured proxy is used; environment proxies are ignored.
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| MirrorError::Network(e.to_string()))?;

        Ok(Self {
            client,
            max_concurrency: config.max_concurrency,
            min_delay: Duration::from_millis(config.min_delay_ms),
            request_timeout,
        })
    }

    fn map_error(&self, url: &Url, e: reqwest::Error) -> MirrorError {
        warn!(url = %url, error = %e, "fetch failed");
        if e.is_timeout() {
            MirrorError::Timeout(self.request_timeout.as_secs())
        } else {
            MirrorError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpDriver {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, MirrorError> {
        let start = Instant::now();
        debug!(url = %url, "fetching");

        let resp = self
            .client
            .get(url.as_str())
            .timeout(config.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        if let Some(len) = resp.content_length() {
            if len as usize > config.max_body_size {
                return Err(MirrorError::BodyTooLarge {
                    size: len as usize,
                    max: config.max_body_size,
                });
            }
        }

        let status = resp.status().as_u16();
        let final_url = Url::parse(resp.url().as_str()).unwrap_or_else(|_| url.clone());

        let mut headers = HashMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let body = resp.bytes().await.map_err(|e| self.map_error(url, e))?;
        if body.len() > config.max_body_size {
            return Err(MirrorError::BodyTooLarge {
                size: body.len(),
                max: config.max_body_size,
            });
        }

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status,
            headers,
            body: body.to_vec(),
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn default_delay(&self) -> Duration {
        self.min_delay
    }
}
