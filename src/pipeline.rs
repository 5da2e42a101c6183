use crate::assets::AssetClient;
use crate::cache::MemoCache;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::dimensions::{DimensionEnricher, DimensionError};
use crate::error::MediaError;
use crate::extract::{KeywordConfig, KeywordPaths, extract_media_urls};
use crate::graph::GraphClient;
use crate::handlers::{Handler, SynthesisContext};
use crate::media::{MediaKind, MediaRecord};
use crate::probe::{ContentTypeProber, ProbeResult};
use crate::swap::{SlotAssignment, TypeSwapResolver};
use crate::token::{Chain, TokenIdentifier, TokenMetadata};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const HANDLER_CACHE_CAPACITY: usize = 10_000;

/// What resolving one token produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Metadata rendered from on-chain state by a registered handler.
    Synthesized(TokenMetadata),
    /// Media located through the token's own metadata.
    Media(MediaRecord),
}

#[derive(Clone)]
pub struct MediaPipeline {
    synthesis: SynthesisContext,
    resolver: TypeSwapResolver,
    enricher: DimensionEnricher,
    keywords: KeywordConfig,
    handlers: MemoCache<(Chain, String), Option<Handler>>,
    probe_deadline: Duration,
}

impl MediaPipeline {
    pub fn new(
        synthesis: SynthesisContext,
        enricher: DimensionEnricher,
        keywords: KeywordConfig,
        probe_deadline: Duration,
    ) -> Self {
        let resolver = TypeSwapResolver::new(synthesis.prober.clone());
        Self {
            synthesis,
            resolver,
            enricher,
            keywords,
            handlers: MemoCache::new(HANDLER_CACHE_CAPACITY),
            probe_deadline,
        }
    }

    /// Wires the reqwest, ethers and graph clients from configuration.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let assets = Arc::new(AssetClient::new(config.clone())?);
        let chain = Arc::new(ChainClient::new(config.clone()));
        let graph = Arc::new(GraphClient::new(config.clone())?);
        let prober = ContentTypeProber::new(assets.clone(), assets.clone(), assets.clone());
        let synthesis = SynthesisContext {
            chain,
            graph,
            body: assets.clone(),
            prober,
        };
        let enricher = DimensionEnricher::new(assets, &config);
        let keywords = KeywordConfig::new(
            config.image_keywords.clone(),
            config.animation_keywords.clone(),
        );
        Ok(Self::new(synthesis, enricher, keywords, config.probe_deadline))
    }

    /// Deadline for a resolution starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.probe_deadline
    }

    pub fn keywords_for(&self, token: &TokenIdentifier) -> KeywordPaths {
        self.keywords.for_token(token.chain, &token.contract_address)
    }

    pub async fn resolve(
        &self,
        token: &TokenIdentifier,
        metadata: &TokenMetadata,
        keywords: &KeywordPaths,
        deadline: Instant,
    ) -> Result<Resolution, MediaError> {
        match self.synthesize(token, deadline).await {
            Ok(synthesized) => return Ok(Resolution::Synthesized(synthesized)),
            Err(err) if err.is_fallback() => {}
            Err(err) => return Err(err),
        }
        let urls = extract_media_urls(metadata, keywords)?;
        debug!(
            token = %token,
            image = ?urls.image,
            animation = ?urls.animation,
            "extracted media urls"
        );
        let assignment = self.resolver.resolve(&urls, deadline).await?;
        Ok(Resolution::Media(media_record(assignment)))
    }

    /// Handler output for `token`, or `NoCustomMetadataHandler`.
    pub async fn synthesize(
        &self,
        token: &TokenIdentifier,
        deadline: Instant,
    ) -> Result<TokenMetadata, MediaError> {
        let key = (token.chain, token.contract_address.clone());
        let handler = self
            .handlers
            .get_or_insert_with(key, || Handler::lookup(&token.contract_address, token.chain))
            .ok_or(MediaError::NoCustomMetadataHandler)?;
        handler.synthesize(&self.synthesis, token, deadline).await
    }

    pub async fn enrich(
        &self,
        record: &MediaRecord,
        deadline: Instant,
    ) -> Result<MediaRecord, DimensionError> {
        self.enricher.enrich(record, deadline).await
    }

    pub async fn enrich_batch(
        &self,
        records: Vec<MediaRecord>,
        deadline: Instant,
    ) -> Vec<MediaRecord> {
        self.enricher.enrich_batch(records, deadline).await
    }
}

/// The animation slot is primary when filled; the image slot then becomes
/// the thumbnail.
fn media_record(assignment: SlotAssignment) -> MediaRecord {
    let SlotAssignment {
        image,
        animation,
        image_probe,
        animation_probe,
        ..
    } = assignment;
    let (primary_url, probe, thumbnail_url) = match animation {
        Some(animation) => (animation, animation_probe, image),
        None => (image.unwrap_or_default(), image_probe, None),
    };
    let (kind, content_type) = match probe {
        Some(ProbeResult {
            kind, content_type, ..
        }) => (kind, content_type),
        None => (MediaKind::Unknown, String::new()),
    };
    MediaRecord {
        kind,
        content_type,
        primary_url,
        thumbnail_url,
        dimensions: None,
    }
}
