//! Lucida HTTP client
//!
//! Implements [`RetrievalTransport`] against a primary and an optional
//! backup deployment. HTTP and protocol failures are folded into
//! [`FailureKind`] here so nothing above the transport sees reqwest types.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{StatusCode, Url};

use super::{dto, page};
use crate::config::{EndpointsConfig, NetworkConfig};
use crate::error::{Error, Result};
use crate::model::{EndpointMode, FailureKind};
use crate::services::{CatalogEntry, ChunkSource, RetrievalTransport, SearchQuery, StreamHandle};

const LOAD_PATH: &str = "/api/load?url=/api/fetch/stream/v2";

/// Lucida client bound to one primary/backup pair
pub struct LucidaClient {
    http_client: reqwest::Client,
    primary: Url,
    backup: Option<Url>,
    request_timeout: Duration,
    poll_interval: Duration,
    poll_timeout: Duration,
}

/// Browser-like user agent with randomised version numbers
fn random_user_agent() -> String {
    let mut rng = rand::rng();
    format!(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_{}_{}) AppleWebKit/{}.{} (KHTML, like Gecko) Chrome/{}.0.{}.{} Safari/{}.{}",
        rng.random_range(11..15),
        rng.random_range(4..9),
        rng.random_range(530..537),
        rng.random_range(30..37),
        rng.random_range(80..105),
        rng.random_range(3000..4500),
        rng.random_range(60..125),
        rng.random_range(530..537),
        rng.random_range(30..36),
    )
}

fn parse_base(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::config(format!("{} is not a valid URL ({}): {}", name, e, value)))
}

/// Map a transport-level reqwest error.
fn classify_error(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::Timeout
    } else if e.is_decode() || e.is_body() {
        FailureKind::Corrupt
    } else {
        FailureKind::EndpointDown
    }
}

/// Map a non-success HTTP status.
fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FailureKind::RateLimited,
        StatusCode::NOT_FOUND | StatusCode::GONE => FailureKind::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FailureKind::Timeout,
        s if s.is_server_error() => FailureKind::EndpointDown,
        // Cloudflare challenges and bans
        StatusCode::FORBIDDEN => FailureKind::EndpointDown,
        _ => FailureKind::NotFound,
    }
}

/// Map an error message reported inside a successful HTTP response.
fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if lower.contains("rate") || lower.contains("too many") {
        FailureKind::RateLimited
    } else if lower.contains("timed out") || lower.contains("timeout") {
        FailureKind::Timeout
    } else {
        FailureKind::NotFound
    }
}

/// `X-CSRF-Token` value from a `csrf_token` cookie, if the server set one
fn csrf_token(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .find_map(|pair| pair.trim().strip_prefix("csrf_token="))
        .map(str::to_string)
}

/// Worker URL: `https://{server}.{host}[:port]/api/fetch/request/{handoff}`
fn worker_url(base: &Url, server: &str, handoff: &str) -> std::result::Result<Url, FailureKind> {
    let host = base.host_str().ok_or(FailureKind::EndpointDown)?;
    let port = base.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Url::parse(&format!(
        "{}://{}.{}{}/api/fetch/request/{}",
        base.scheme(),
        server,
        host,
        port,
        urlencoding::encode(handoff)
    ))
    .map_err(|_| FailureKind::Corrupt)
}

impl LucidaClient {
    /// Create a client from the endpoint and network settings
    pub fn new(endpoints: &EndpointsConfig, network: &NetworkConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(network.request_timeout_secs);
        let http_client = reqwest::Client::builder()
            .user_agent(random_user_agent())
            .connect_timeout(request_timeout)
            .read_timeout(request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Self::with_http_client(http_client, endpoints, network)
    }

    fn with_http_client(
        http_client: reqwest::Client,
        endpoints: &EndpointsConfig,
        network: &NetworkConfig,
    ) -> Result<Self> {
        let primary = parse_base("endpoints.primary", &endpoints.primary)?;
        let backup = match endpoints.backup.trim() {
            "" => None,
            value => Some(parse_base("endpoints.backup", value)?),
        };

        Ok(Self {
            http_client,
            primary,
            backup,
            request_timeout: Duration::from_secs(network.request_timeout_secs),
            poll_interval: Duration::from_millis(network.poll_interval_ms),
            poll_timeout: Duration::from_secs(network.poll_timeout_secs),
        })
    }

    /// Base URL for an endpoint mode. Without a backup, Backup is unreachable.
    fn base(&self, endpoint: EndpointMode) -> std::result::Result<&Url, FailureKind> {
        match endpoint {
            EndpointMode::Primary => Ok(&self.primary),
            EndpointMode::Backup => self.backup.as_ref().ok_or(FailureKind::EndpointDown),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> std::result::Result<reqwest::Response, FailureKind> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Lucida answered HTTP {} for {}", status, response.url());
            return Err(classify_status(status));
        }
        Ok(response)
    }

    /// Ask the worker to prepare the file, returning (server, handoff, csrf)
    async fn load(
        &self,
        base: &Url,
        entry: &CatalogEntry,
    ) -> std::result::Result<(String, String, Option<String>), FailureKind> {
        let access = entry.access.as_ref().ok_or(FailureKind::NotFound)?;
        let url = base.join(LOAD_PATH).map_err(|_| FailureKind::EndpointDown)?;
        let body = dto::LoadRequest::original_quality(&entry.locator, &access.primary, access.expiry);

        let response = self.send(self.http_client.post(url).json(&body)).await?;
        let csrf = csrf_token(response.headers());
        let load: dto::LoadResponse = response.json().await.map_err(|e| classify_error(&e))?;

        if !load.success {
            let message = load.error.unwrap_or_else(|| "Unknown error".to_string());
            tracing::debug!("Lucida load request failed: {}", message);
            return Err(classify_message(&message));
        }

        match (load.server, load.handoff) {
            (Some(server), Some(handoff)) => Ok((server, handoff, csrf)),
            _ => Err(FailureKind::Corrupt),
        }
    }

    /// Poll the worker until the file is ready
    async fn wait_until_ready(&self, status_url: &Url, csrf: Option<&str>) -> std::result::Result<(), FailureKind> {
        let poll = async {
            loop {
                let mut request = self.http_client.get(status_url.clone());
                if let Some(token) = csrf {
                    request = request.header("X-CSRF-Token", token);
                }
                let status: dto::StatusResponse =
                    self.send(request).await?.json().await.map_err(|e| classify_error(&e))?;

                match status.status.as_str() {
                    "completed" => return Ok::<(), FailureKind>(()),
                    "error" => {
                        let message = status.message.unwrap_or_else(|| "Unknown error".to_string());
                        tracing::debug!("Lucida worker reported an error: {}", message);
                        return Err(classify_message(&message));
                    }
                    other => {
                        if let Some(progress) = status.progress
                            && progress.total > 0
                        {
                            tracing::trace!("Preparing ({}): {}/{}", other, progress.current, progress.total);
                        }
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.poll_timeout, poll)
            .await
            .unwrap_or(Err(FailureKind::Timeout))
    }
}

/// Download body streamed chunk by chunk
struct ResponseStream {
    response: reqwest::Response,
}

#[async_trait]
impl ChunkSource for ResponseStream {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Vec<u8>>, FailureKind> {
        match self.response.chunk().await {
            Ok(chunk) => Ok(chunk.map(|bytes| bytes.to_vec())),
            Err(e) if e.is_timeout() => Err(FailureKind::Timeout),
            Err(_) => Err(FailureKind::Corrupt),
        }
    }
}

#[async_trait]
impl RetrievalTransport for LucidaClient {
    async fn search(
        &self,
        endpoint: EndpointMode,
        query: &SearchQuery,
    ) -> std::result::Result<Vec<CatalogEntry>, FailureKind> {
        let base = self.base(endpoint)?;
        let request = self.http_client.get(base.clone()).query(&[
            ("url", query.spotify_url.as_str()),
            ("country", "auto"),
            ("to", query.service.as_str()),
        ]);
        let html = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(|e| classify_error(&e))?;

        match page::parse_page(&html, query.service) {
            Some(entry) => Ok(vec![entry]),
            None => {
                tracing::debug!(
                    service = %query.service,
                    endpoint = %endpoint,
                    "No conversion result in page for '{}'",
                    query.title
                );
                Ok(Vec::new())
            }
        }
    }

    async fn open(&self, endpoint: EndpointMode, entry: &CatalogEntry) -> std::result::Result<StreamHandle, FailureKind> {
        let base = self.base(endpoint)?;

        let (server, handoff, csrf) = self.load(base, entry).await?;
        let status_url = worker_url(base, &server, &handoff)?;
        self.wait_until_ready(&status_url, csrf.as_deref()).await?;

        let download_url = Url::parse(&format!("{}/download", status_url)).map_err(|_| FailureKind::Corrupt)?;
        let mut request = self.http_client.get(download_url);
        if let Some(ref token) = csrf {
            request = request.header("X-CSRF-Token", token);
        }

        // No overall timeout on the body; read_timeout guards stalls
        let response = request.send().await.map_err(|e| classify_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        Ok(StreamHandle {
            service: entry.service,
            expected_len: response.content_length(),
            source: Box::new(ResponseStream { response }),
        })
    }
}
