/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Outbound text fetches for manifests and remote catalogs.

use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFetchError {
    InvalidUrl(String),
    UnsupportedScheme(String),
    Client(String),
    Network(String),
    HttpStatus(u16),
    Body(String),
}

impl std::fmt::Display for OutboundFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(e) => write!(f, "invalid URL: {e}"),
            Self::UnsupportedScheme(scheme) => write!(f, "unsupported scheme '{scheme}'"),
            Self::Client(e) => write!(f, "HTTP client setup failed: {e}"),
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::HttpStatus(status) => write!(f, "HTTP status {status}"),
            Self::Body(e) => write!(f, "failed to read response body: {e}"),
        }
    }
}

impl std::error::Error for OutboundFetchError {}

/// Anything that can fetch a URL as text. Closures qualify, which keeps
/// manifest and catalog tests off the network.
pub trait TextFetcher: Send + Sync {
    fn fetch_text(&self, url: &Url) -> Result<String, OutboundFetchError>;
}

impl<F> TextFetcher for F
where
    F: Fn(&Url) -> Result<String, OutboundFetchError> + Send + Sync,
{
    fn fetch_text(&self, url: &Url) -> Result<String, OutboundFetchError> {
        self(url)
    }
}

/// Blocking HTTP(S) fetcher with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, OutboundFetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("appshelf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OutboundFetchError::Client(format!("{e}")))?;
        Ok(Self { client })
    }
}

impl TextFetcher for HttpFetcher {
    fn fetch_text(&self, url: &Url) -> Result<String, OutboundFetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OutboundFetchError::UnsupportedScheme(url.scheme().to_string()));
        }
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| OutboundFetchError::Network(format!("{e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OutboundFetchError::HttpStatus(status.as_u16()));
        }
        response
            .text()
            .map_err(|e| OutboundFetchError::Body(format!("{e}")))
    }
}

/// Parse `raw` and fetch it through `fetcher`.
pub fn fetch_text(fetcher: &dyn TextFetcher, raw: &str) -> Result<String, OutboundFetchError> {
    let parsed = Url::parse(raw).map_err(|e| OutboundFetchError::InvalidUrl(format!("{e}")))?;
    fetcher.fetch_text(&parsed)
}
