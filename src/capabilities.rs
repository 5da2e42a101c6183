//! Capabilities the resolution core consumes but does not implement itself.
//!
//! Production implementations live in `assets`, `chain` and `graph`; tests
//! substitute in-memory fakes.

use crate::error::MediaError;
use crate::token::TokenIdentifier;
use async_trait::async_trait;
use bytes::Bytes;

/// Transport-level description of a remote payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub content_type: String,
    pub content_length: Option<u64>,
}

/// Header lookup for HTTP-class transports.
#[async_trait]
pub trait FetchHeader: Send + Sync {
    async fn fetch_header(&self, url: &str) -> Result<HeaderInfo, MediaError>;
}

/// Header lookup against the content-addressed network's own node, keyed by
/// the path below `/ipfs/`.
#[async_trait]
pub trait FetchNativeHeader: Send + Sync {
    async fn fetch_native_header(&self, content_path: &str) -> Result<HeaderInfo, MediaError>;
}

/// Picks an HTTP mirror for a permanent-storage pointer.
#[async_trait]
pub trait BestGateway: Send + Sync {
    async fn best_gateway_for(&self, uri: &str) -> Result<String, MediaError>;
}

/// Retrieves a (size-capped) body. Used for metadata documents and for the
/// markup parsed by the dimension enricher.
#[async_trait]
pub trait FetchBody: Send + Sync {
    async fn fetch_body(&self, uri: &str) -> Result<Bytes, MediaError>;
}

/// Typed read-only contract calls used by the synthesis handlers.
#[async_trait]
pub trait ReadOnChain: Send + Sync {
    /// ERC-721 `tokenURI(uint256)` on the token's own contract.
    async fn token_uri(&self, token: &TokenIdentifier) -> Result<String, MediaError>;
    /// `punkImageSvg(uint16)` on the Cryptopunks data contract.
    async fn punk_image_svg(&self, punk_index: u16) -> Result<String, MediaError>;
    /// `tokenMetadataURI(uint256)` on a Zora media contract.
    async fn token_metadata_uri(&self, token: &TokenIdentifier) -> Result<String, MediaError>;
}

/// Queries an external graph index and returns the raw JSON response.
#[async_trait]
pub trait GraphLookup: Send + Sync {
    async fn query(&self, query: &str) -> Result<serde_json::Value, MediaError>;
}
