use crate::capabilities::{BestGateway, FetchBody, FetchHeader, FetchNativeHeader, HeaderInfo};
use crate::config::Config;
use crate::error::MediaError;
use crate::race::{self, RaceError};
use crate::uri::{self, InlineShape, UriScheme};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use reqwest::{Method, StatusCode, header};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// reqwest-backed implementation of the header, gateway and body capabilities.
#[derive(Clone)]
pub struct AssetClient {
    client: reqwest::Client,
    config: Arc<Config>,
    fetch_semaphore: Arc<Semaphore>,
}

#[derive(Debug, Error)]
pub enum AssetFetchError {
    #[error("invalid asset uri")]
    InvalidUri,
    #[error("asset too large")]
    TooLarge,
    #[error("asset fetch failed from {url}: {status}")]
    UpstreamStatus { status: StatusCode, url: String },
    #[error("asset fetch failed from {url}: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid inline payload")]
    InvalidInline,
}

impl AssetFetchError {
    fn into_media_error(self, uri: &str) -> MediaError {
        match self {
            AssetFetchError::UpstreamStatus { status, .. }
                if status == StatusCode::NOT_FOUND || status == StatusCode::GONE =>
            {
                MediaError::NotFound {
                    uri: uri.to_string(),
                }
            }
            other => MediaError::transport(uri, other),
        }
    }
}

impl AssetClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.clone())
            .build()
            .context("build reqwest client")?;
        let fetch_semaphore = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
        Ok(Self {
            client,
            config,
            fetch_semaphore,
        })
    }

    /// HEAD and GET are raced; many gateways reject HEAD, and a GET whose body
    /// is never read costs little more than its headers.
    async fn race_header_methods(&self, url: &str) -> Result<HeaderInfo, MediaError> {
        let strategies = [Method::HEAD, Method::GET]
            .into_iter()
            .map(|method| {
                let client = self.clone();
                let url = url.to_string();
                race::strategy(async move { client.request_header(method, &url).await })
            })
            .collect::<Vec<_>>();
        race::first_acceptable(strategies, |_| true)
            .await
            .map_err(|err| race_failure(url, err))
    }

    async fn request_header(&self, method: Method, url: &str) -> Result<HeaderInfo, MediaError> {
        let parsed = parse_http_url(url).map_err(|err| err.into_media_error(url))?;
        let _permit = self
            .fetch_semaphore
            .acquire()
            .await
            .map_err(|err| MediaError::transport(url, err))?;
        let response = self
            .client
            .request(method.clone(), parsed)
            .send()
            .await
            .map_err(|source| {
                AssetFetchError::Upstream {
                    url: url.to_string(),
                    source,
                }
                .into_media_error(url)
            })?;
        if !response.status().is_success() {
            return Err(AssetFetchError::UpstreamStatus {
                status: response.status(),
                url: url.to_string(),
            }
            .into_media_error(url));
        }
        let headers = response.headers();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .unwrap_or_default();
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        debug!(url = %url, method = %method, content_type = %content_type, "fetched headers");
        Ok(HeaderInfo {
            content_type,
            content_length,
        })
    }

    async fn fetch_http_bytes(&self, url: &str) -> Result<Bytes, AssetFetchError> {
        let parsed = parse_http_url(url)?;
        let _permit = self
            .fetch_semaphore
            .acquire()
            .await
            .map_err(|_| AssetFetchError::InvalidUri)?;
        let mut response =
            self.client
                .get(parsed)
                .send()
                .await
                .map_err(|source| AssetFetchError::Upstream {
                    url: url.to_string(),
                    source,
                })?;
        if response.status() != StatusCode::OK {
            return Err(AssetFetchError::UpstreamStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }
        let max_bytes = self.config.max_body_bytes;
        if let Some(length) = response.content_length() {
            if length > max_bytes as u64 {
                return Err(AssetFetchError::TooLarge);
            }
        }
        let mut buffer = BytesMut::with_capacity(std::cmp::min(max_bytes, 64 * 1024));
        let mut total = 0usize;
        while let Some(chunk) =
            response
                .chunk()
                .await
                .map_err(|source| AssetFetchError::Upstream {
                    url: url.to_string(),
                    source,
                })?
        {
            total = total.saturating_add(chunk.len());
            if total > max_bytes {
                return Err(AssetFetchError::TooLarge);
            }
            buffer.extend_from_slice(&chunk);
        }
        debug!(url = %url, size = total, "fetched body");
        Ok(buffer.freeze())
    }

    async fn fetch_ipfs_bytes(&self, uri: &str) -> Result<Bytes, MediaError> {
        let (cid, path) = uri::parse_ipfs_uri(uri).map_err(|err| MediaError::transport(uri, err))?;
        let mut last_err = None;
        for (index, gateway) in self.config.ipfs_gateways.iter().enumerate() {
            let url = format!("{gateway}{cid}{path}");
            match self.fetch_http_bytes(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    warn!(
                        ipfs_url = %url,
                        attempt = index + 1,
                        error = %err,
                        "ipfs fetch failed, rotating gateway"
                    );
                    last_err = Some(err.into_media_error(uri));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| MediaError::transport(uri, "no ipfs gateways configured")))
    }

    fn arweave_url(&self, uri: &str) -> String {
        format!("{}/{}", self.config.arweave_gateway, uri::ledger_path(uri))
    }
}

#[async_trait]
impl FetchHeader for AssetClient {
    async fn fetch_header(&self, url: &str) -> Result<HeaderInfo, MediaError> {
        self.race_header_methods(url).await
    }
}

#[async_trait]
impl FetchNativeHeader for AssetClient {
    async fn fetch_native_header(&self, content_path: &str) -> Result<HeaderInfo, MediaError> {
        let url = format!(
            "{}/ipfs/{}",
            self.config.ipfs_api_url,
            content_path.trim_start_matches('/')
        );
        self.race_header_methods(&url).await
    }
}

#[async_trait]
impl BestGateway for AssetClient {
    async fn best_gateway_for(&self, uri: &str) -> Result<String, MediaError> {
        match uri::classify(uri) {
            Some(UriScheme::LedgerNative) => Ok(self.arweave_url(uri)),
            _ => Err(AssetFetchError::InvalidUri.into_media_error(uri)),
        }
    }
}

#[async_trait]
impl FetchBody for AssetClient {
    async fn fetch_body(&self, uri: &str) -> Result<Bytes, MediaError> {
        match uri::classify(uri) {
            Some(UriScheme::ContentAddressedNative) => self.fetch_ipfs_bytes(uri).await,
            Some(UriScheme::LedgerNative) => {
                let url = self.arweave_url(uri);
                self.fetch_http_bytes(&url)
                    .await
                    .map_err(|err| err.into_media_error(uri))
            }
            Some(UriScheme::Inline(shape)) => {
                decode_inline(uri, &shape).map_err(|err| err.into_media_error(uri))
            }
            Some(_) => self
                .fetch_http_bytes(uri)
                .await
                .map_err(|err| err.into_media_error(uri)),
            None => Err(AssetFetchError::InvalidUri.into_media_error(uri)),
        }
    }
}

fn race_failure(url: &str, err: RaceError<MediaError>) -> MediaError {
    match err {
        RaceError::Join(join) => MediaError::transport(url, join),
        other => other
            .into_last()
            .unwrap_or_else(|| MediaError::transport(url, "no header strategies")),
    }
}

fn parse_http_url(url: &str) -> Result<Url, AssetFetchError> {
    let parsed = Url::parse(url.trim()).map_err(|_| AssetFetchError::InvalidUri)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(AssetFetchError::InvalidUri),
    }
}

/// Decodes the payload of an inline reference without touching the network.
pub fn decode_inline(uri: &str, shape: &InlineShape) -> Result<Bytes, AssetFetchError> {
    let trimmed = uri.trim();
    if !trimmed.starts_with("data:") {
        return match shape {
            InlineShape::Json | InlineShape::Svg => Ok(Bytes::copy_from_slice(trimmed.as_bytes())),
            _ => Err(AssetFetchError::InvalidInline),
        };
    }
    let (header, payload) = trimmed
        .split_once(',')
        .ok_or(AssetFetchError::InvalidInline)?;
    if header.to_ascii_lowercase().ends_with(";base64") {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| AssetFetchError::InvalidInline)?;
        return Ok(Bytes::from(decoded));
    }
    Ok(Bytes::copy_from_slice(payload.as_bytes()))
}
