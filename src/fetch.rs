//! Page fetcher: one HTTP GET per source, every failure typed and contained.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, trace};

use crate::registry::Source;

/// Desktop browser identity; several regional portals reject unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Why a source produced no page this run.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Http(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("unreadable response body: {0}")]
    Body(String),
    /// The request was in flight when the run budget ran out.
    #[error("abandoned when the run budget ran out")]
    BudgetExhausted,
}

impl FetchError {
    /// Stable label used in run statistics and logs.
    pub fn kind(&self) -> String {
        match self {
            Self::Timeout => "timeout".to_string(),
            Self::Http(status) => format!("http-error:{status}"),
            Self::Network(_) => "network-error".to_string(),
            Self::Body(_) => "body-error".to_string(),
            Self::BudgetExhausted => "budget-exhausted".to_string(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Http(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Anything that can turn a source into page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError>;
}

/// Fetches pages over HTTP with a bounded per-request timeout.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("it-IT,it;q=0.9,en;q=0.5"),
        );

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        trace!(label = source.label.as_str(), endpoint = %source.endpoint, "GET");

        let resp = self
            .http
            .get(source.endpoint.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let body = resp.text().await.map_err(FetchError::from_reqwest)?;
        debug!(
            label = source.label.as_str(),
            bytes = body.len(),
            "Fetched source page"
        );
        Ok(body)
    }
}
