use std::error::Error as _;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use url::Url;

use crate::{FailureKind, FetchError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How a single connection attempt picks its address family.
///
/// Download attempts walk an ordered list of strategies, one per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStrategy {
    /// Whatever the resolver returns first.
    System,
    Ipv4Only,
    Ipv6Only,
}

impl ConnectStrategy {
    pub const DEFAULT_ORDER: [ConnectStrategy; 3] = [
        ConnectStrategy::System,
        ConnectStrategy::Ipv4Only,
        ConnectStrategy::Ipv6Only,
    ];

    fn local_address(self) -> Option<IpAddr> {
        match self {
            ConnectStrategy::System => None,
            ConnectStrategy::Ipv4Only => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            ConnectStrategy::Ipv6Only => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        }
    }
}

impl fmt::Display for ConnectStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectStrategy::System => write!(f, "default"),
            ConnectStrategy::Ipv4Only => write!(f, "IPv4"),
            ConnectStrategy::Ipv6Only => write!(f, "IPv6"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Idle time allowed between two reads of a response body.
    pub read_timeout: Duration,
    /// Whole-request bound for listing pages.
    pub listing_timeout: Duration,
    /// Whole-request bound for size probes.
    pub probe_timeout: Duration,
    /// Whole-request bound for seed reachability checks.
    pub validation_timeout: Duration,
    pub redirect_limit: usize,
    pub max_attempts: u32,
    pub strategies: Vec<ConnectStrategy>,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            listing_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(10),
            validation_timeout: Duration::from_secs(5),
            redirect_limit: 10,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategies: ConnectStrategy::DEFAULT_ORDER.to_vec(),
            user_agent: concat!("assetfetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    /// Strategy used for the 1-based `attempt`, cycling through the configured order.
    pub fn strategy_for(&self, attempt: u32) -> ConnectStrategy {
        if self.strategies.is_empty() {
            return ConnectStrategy::System;
        }
        let index = (attempt.saturating_sub(1) as usize) % self.strategies.len();
        self.strategies[index]
    }
}

/// A fully buffered listing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub final_url: Url,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// An open response whose body has not been read yet.
pub struct BodyStream {
    /// Length announced by the server, if any.
    pub expected_len: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, FetchError>>,
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// GET a listing page and buffer it.
    async fn fetch_page(&self, url: &Url) -> Result<Page, FetchError>;

    /// GET with a short timeout, reading headers only. Returns the final status.
    async fn check_reachable(&self, url: &Url) -> Result<StatusCode, FetchError>;

    /// HEAD request; `None` when the server gives no usable length.
    async fn probe_length(&self, url: &Url) -> Result<Option<u64>, FetchError>;

    /// GET that stops after the response headers; `None` when no length is announced.
    async fn header_length(&self, url: &Url) -> Result<Option<u64>, FetchError>;

    /// Start a streamed GET using the given connection strategy.
    async fn open(&self, url: &Url, strategy: ConnectStrategy) -> Result<BodyStream, FetchError>;
}

#[derive(Debug, Clone)]
struct Clients {
    system: reqwest::Client,
    ipv4: reqwest::Client,
    ipv6: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    clients: Clients,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let clients = Clients {
            system: build_client(&settings, ConnectStrategy::System)?,
            ipv4: build_client(&settings, ConnectStrategy::Ipv4Only)?,
            ipv6: build_client(&settings, ConnectStrategy::Ipv6Only)?,
        };
        Ok(Self { settings, clients })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn client(&self, strategy: ConnectStrategy) -> &reqwest::Client {
        match strategy {
            ConnectStrategy::System => &self.clients.system,
            ConnectStrategy::Ipv4Only => &self.clients.ipv4,
            ConnectStrategy::Ipv6Only => &self.clients.ipv6,
        }
    }
}

fn build_client(
    settings: &FetchSettings,
    strategy: ConnectStrategy,
) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .read_timeout(settings.read_timeout)
        .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
        .user_agent(settings.user_agent.clone())
        .local_address(strategy.local_address())
        .build()
        .map_err(|err| FetchError::new(FailureKind::Network, error_chain(&err)))
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<Page, FetchError> {
        let response = self
            .client(ConnectStrategy::System)
            .get(url.clone())
            .timeout(self.settings.listing_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(Page {
            final_url,
            content_type,
            body,
        })
    }

    async fn check_reachable(&self, url: &Url) -> Result<StatusCode, FetchError> {
        let response = self
            .client(ConnectStrategy::System)
            .get(url.clone())
            .timeout(self.settings.validation_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        // Dropping the response abandons the body.
        Ok(response.status())
    }

    async fn probe_length(&self, url: &Url) -> Result<Option<u64>, FetchError> {
        let response = self
            .client(ConnectStrategy::System)
            .head(url.clone())
            .timeout(self.settings.probe_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(declared_length(&response))
    }

    async fn header_length(&self, url: &Url) -> Result<Option<u64>, FetchError> {
        let response = self
            .client(ConnectStrategy::System)
            .get(url.clone())
            .timeout(self.settings.probe_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(declared_length(&response))
    }

    async fn open(&self, url: &Url, strategy: ConnectStrategy) -> Result<BodyStream, FetchError> {
        let response = self
            .client(strategy)
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;
        let expected_len = declared_length(&response);
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed();
        Ok(BodyStream {
            expected_len,
            chunks,
        })
    }
}

fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

// Read the header directly: for HEAD responses the body size hint is always zero.
fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    let message = error_chain(&err);
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, message);
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, message);
    }
    if err.is_builder() {
        return FetchError::new(FailureKind::InvalidUrl, message);
    }
    FetchError::new(FailureKind::Network, message)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
