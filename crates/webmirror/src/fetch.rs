//! HTTP GET against the origin.
//!
//! Not a browser, just requests that look like one. No retries here; the
//! acquisition loop owns the retry policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};

use crate::config::OriginConfig;
use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/117.0.0.0 Safari/537.36";

pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
                                  image/avif,image/webp,image/apng,*/*;q=0.8";

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Anything that can GET a URL and hand back the body.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<'a, T: Fetch + ?Sized> Fetch for &'a T {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(url).await
    }
}

#[async_trait]
impl<T: Fetch + ?Sized> Fetch for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(url).await
    }
}

/// reqwest-backed fetcher with a fixed browser-like header set.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &OriginConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| FetchError::transport(&config.root_url, e))?,
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::transport(&config.root_url, e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        tracing::trace!(url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}
