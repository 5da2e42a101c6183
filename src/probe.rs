use crate::capabilities::{BestGateway, FetchHeader, FetchNativeHeader, HeaderInfo};
use crate::error::MediaError;
use crate::media::{MediaKind, kind_from_extension, strip_content_type_params};
use crate::race::{self, RaceError};
use crate::uri::{self, InlineShape, UriScheme};
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub kind: MediaKind,
    pub content_type: String,
    pub content_length: Option<u64>,
}

impl ProbeResult {
    fn unknown() -> Self {
        Self {
            kind: MediaKind::Unknown,
            content_type: String::new(),
            content_length: None,
        }
    }

    fn from_header(header: HeaderInfo) -> Self {
        let content_type = strip_content_type_params(&header.content_type).to_string();
        Self {
            kind: MediaKind::from_content_type(&content_type),
            content_type,
            content_length: header.content_length,
        }
    }

    fn fixed(kind: MediaKind, content_type: &str, content_length: Option<u64>) -> Self {
        Self {
            kind,
            content_type: content_type.to_string(),
            content_length,
        }
    }
}

/// Learns the kind and content type of a media reference with the least
/// network work available for its transport.
#[derive(Clone)]
pub struct ContentTypeProber {
    http: Arc<dyn FetchHeader>,
    native: Arc<dyn FetchNativeHeader>,
    gateways: Arc<dyn BestGateway>,
}

impl ContentTypeProber {
    pub fn new(
        http: Arc<dyn FetchHeader>,
        native: Arc<dyn FetchNativeHeader>,
        gateways: Arc<dyn BestGateway>,
    ) -> Self {
        Self {
            http,
            native,
            gateways,
        }
    }

    /// Probes `uri`, giving up at `deadline` with `DeadlineExceeded`.
    pub async fn probe(&self, uri: &str, deadline: Instant) -> Result<ProbeResult, MediaError> {
        timeout_at(deadline, self.probe_uncapped(uri)).await?
    }

    async fn probe_uncapped(&self, uri: &str) -> Result<ProbeResult, MediaError> {
        let uri = uri.trim();
        if let Some((kind, content_type)) = kind_from_extension(uri) {
            debug!(uri = %truncate(uri), kind = %kind, "classified by extension");
            return Ok(ProbeResult::fixed(kind, content_type, None));
        }
        let Some(scheme) = uri::classify(uri) else {
            debug!(uri = %truncate(uri), "unclassifiable uri");
            return Ok(ProbeResult::unknown());
        };
        debug!(uri = %truncate(uri), scheme = ?scheme, "probing");
        match scheme {
            UriScheme::Inline(shape) => Ok(classify_inline(&shape, uri.len() as u64)),
            UriScheme::ContentAddressedNative => {
                let header = self.native.fetch_native_header(&uri::content_path(uri)).await?;
                Ok(ProbeResult::from_header(header))
            }
            UriScheme::ContentAddressedGateway => self.race_gateway(uri).await,
            UriScheme::LedgerNative => {
                let url = self.gateways.best_gateway_for(uri).await?;
                let header = self.http.fetch_header(&url).await?;
                Ok(ProbeResult::from_header(header))
            }
            UriScheme::Http | UriScheme::PeerApi | UriScheme::LedgerGateway => {
                let header = self.http.fetch_header(uri).await?;
                Ok(ProbeResult::from_header(header))
            }
        }
    }

    /// Native node and gateway URL are raced; a not-found from either one
    /// waits for the other.
    async fn race_gateway(&self, uri: &str) -> Result<ProbeResult, MediaError> {
        let native = self.native.clone();
        let path = uri::content_path(uri);
        let http = self.http.clone();
        let url = uri.to_string();
        let strategies = vec![
            race::strategy(async move { native.fetch_native_header(&path).await }),
            race::strategy(async move { http.fetch_header(&url).await }),
        ];
        match race::first_acceptable(strategies, MediaError::is_not_found).await {
            Ok(header) => Ok(ProbeResult::from_header(header)),
            Err(RaceError::Join(err)) => Err(MediaError::transport(uri, err)),
            Err(err) => Err(err.into_last().unwrap_or_else(|| MediaError::NotFound {
                uri: uri.to_string(),
            })),
        }
    }
}

fn classify_inline(shape: &InlineShape, length: u64) -> ProbeResult {
    match shape {
        InlineShape::Json | InlineShape::Base64Json => {
            ProbeResult::fixed(MediaKind::Text, "application/json", Some(length))
        }
        InlineShape::Svg | InlineShape::Base64Svg => {
            ProbeResult::fixed(MediaKind::Svg, "image/svg+xml", Some(length))
        }
        InlineShape::Base64Bmp => ProbeResult::fixed(MediaKind::Image, "image/bmp", Some(length)),
        InlineShape::Base64Png => ProbeResult::fixed(MediaKind::Image, "image/png", Some(length)),
        InlineShape::Data(declared) => ProbeResult {
            kind: MediaKind::from_content_type(declared),
            content_type: declared.clone(),
            content_length: Some(length),
        },
    }
}

fn truncate(uri: &str) -> &str {
    match uri.char_indices().nth(120) {
        Some((idx, _)) => &uri[..idx],
        None => uri,
    }
}
