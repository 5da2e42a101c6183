//! Metadata synthesized from on-chain state for contracts whose artwork never
//! lived at a URL.

use crate::capabilities::{FetchBody, GraphLookup, ReadOnChain};
use crate::colorglyph;
use crate::error::MediaError;
use crate::extract::first_string;
use crate::glyph;
use crate::media::MediaKind;
use crate::probe::ContentTypeProber;
use crate::token::{Chain, TokenIdentifier, TokenMetadata};
use base64::Engine;
use ethers::types::U256;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

pub const AUTOGLYPHS_ADDRESS: &str = "0xd4e4078ca3495de5b1d4db434bebc5a986197782";
pub const COLORGLYPHS_ADDRESS: &str = "0x60f3680350f65beb2752788cb48abfce84a4759e";
pub const ENS_ADDRESS: &str = "0x57f1887a8bf19b14fc0df6fd9b2acc9af147ea85";
pub const CRYPTOPUNKS_ADDRESS: &str = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb";
pub const ZORA_ADDRESS: &str = "0xabefbc9fd2f806065b4f3c237d4b59d9a97bcac7";

const ENS_DESCRIPTION: &str = "ENS names are used to resolve domain names to Ethereum addresses.";
const ENS_AVATAR_BASE: &str = "https://metadata.ens.domains/mainnet/avatar";
const ENS_GRAPH_SOURCE: &str = "ens-graph";
const ENS_CANVAS: u32 = 240;
const PUNK_DESCRIPTION: &str = "CryptoPunks launched as a fixed set of 10,000 items in mid-2017 and became one of the inspirations for the ERC-721 standard. They have been featured in places like The New York Times, Christie’s of London, Art|Basel Miami, and The PBS NewsHour.";
const PUNK_SVG_PREFIX: &str = "data:image/svg+xml;utf8,";

const ZORA_NAME_KEYS: [&str; 2] = ["name", "title"];
const ZORA_DESCRIPTION_KEYS: [&str; 3] = ["description", "desc", "notes"];
const ZORA_MIME_KEYS: [&str; 4] = ["mimeType", "contentType", "content-type", "type"];
const ZORA_THUMBNAIL_KEYS: [&str; 3] = ["image", "thumbnail", "uri"];
const ZORA_REPLACED_KEYS: [&str; 4] = ["name", "description", "image", "animation_url"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    Autoglyph,
    Colorglyph,
    Ens,
    Cryptopunk,
    Zora,
}

impl Handler {
    pub const ALL: [Handler; 5] = [
        Handler::Autoglyph,
        Handler::Colorglyph,
        Handler::Ens,
        Handler::Cryptopunk,
        Handler::Zora,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Handler::Autoglyph => "autoglyph",
            Handler::Colorglyph => "colorglyph",
            Handler::Ens => "ens",
            Handler::Cryptopunk => "cryptopunk",
            Handler::Zora => "zora",
        }
    }

    pub fn contract_address(&self) -> &'static str {
        match self {
            Handler::Autoglyph => AUTOGLYPHS_ADDRESS,
            Handler::Colorglyph => COLORGLYPHS_ADDRESS,
            Handler::Ens => ENS_ADDRESS,
            Handler::Cryptopunk => CRYPTOPUNKS_ADDRESS,
            Handler::Zora => ZORA_ADDRESS,
        }
    }

    /// Handler registered for a canonical contract address. All handlers live
    /// on Ethereum.
    pub fn lookup(contract_address: &str, chain: Chain) -> Option<Handler> {
        if chain != Chain::Ethereum {
            return None;
        }
        let address = contract_address.trim();
        Handler::ALL
            .into_iter()
            .find(|handler| handler.contract_address().eq_ignore_ascii_case(address))
    }

    /// Dispatches to the handler for `token`, or reports
    /// `NoCustomMetadataHandler` so the caller can fall back to URL resolution.
    pub async fn synthesize_for(
        ctx: &SynthesisContext,
        token: &TokenIdentifier,
        deadline: Instant,
    ) -> Result<TokenMetadata, MediaError> {
        let handler = Handler::lookup(&token.contract_address, token.chain)
            .ok_or(MediaError::NoCustomMetadataHandler)?;
        handler.synthesize(ctx, token, deadline).await
    }

    pub async fn synthesize(
        &self,
        ctx: &SynthesisContext,
        token: &TokenIdentifier,
        deadline: Instant,
    ) -> Result<TokenMetadata, MediaError> {
        debug!(handler = self.as_str(), token = %token, "synthesizing metadata");
        let work = async {
            match self {
                Handler::Autoglyph => {
                    let token_uri = ctx.chain.token_uri(token).await?;
                    glyph::autoglyph_metadata(token.token_id, &token_uri)
                }
                Handler::Colorglyph => {
                    let token_uri = ctx.chain.token_uri(token).await?;
                    colorglyph::colorglyph_metadata(token.token_id, &token_uri)
                }
                Handler::Ens => ens_metadata(ctx, token.token_id).await,
                Handler::Cryptopunk => punk_metadata(ctx, token.token_id).await,
                Handler::Zora => zora_metadata(ctx, token, deadline).await,
            }
        };
        timeout_at(deadline, work).await?
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities the handlers read from.
#[derive(Clone)]
pub struct SynthesisContext {
    pub chain: Arc<dyn ReadOnChain>,
    pub graph: Arc<dyn GraphLookup>,
    pub body: Arc<dyn FetchBody>,
    pub prober: ContentTypeProber,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Option<EnsDomains>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct EnsDomains {
    #[serde(default)]
    domains: Vec<EnsDomain>,
}

#[derive(Debug, Deserialize)]
struct EnsDomain {
    #[serde(rename = "labelName")]
    label_name: String,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

/// `0x` followed by the token id as 32 big-endian bytes.
pub fn ens_labelhash(token_id: U256) -> String {
    let mut bytes = [0u8; 32];
    token_id.to_big_endian(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

pub fn ens_query(labelhash: &str) -> String {
    format!(r#"{{ domains(first: 1, where: {{labelhash: "{labelhash}"}}) {{ labelName }} }}"#)
}

/// Graph failures surface as transport errors and an unknown labelhash as
/// `NotFound`; more than one domain for a labelhash is malformed.
async fn ens_metadata(
    ctx: &SynthesisContext,
    token_id: U256,
) -> Result<TokenMetadata, MediaError> {
    let labelhash = ens_labelhash(token_id);
    let raw = ctx.graph.query(&ens_query(&labelhash)).await?;
    let response: GraphResponse = serde_json::from_value(raw)
        .map_err(|err| MediaError::transport(ENS_GRAPH_SOURCE, format!("graph response: {err}")))?;
    if let Some(error) = response.errors.first() {
        return Err(MediaError::transport(
            ENS_GRAPH_SOURCE,
            format!("graph error: {}", error.message),
        ));
    }
    let domains = response.data.map(|data| data.domains).unwrap_or_default();
    let label = match domains.as_slice() {
        [domain] => &domain.label_name,
        [] => {
            return Err(MediaError::NotFound {
                uri: format!("ens:{labelhash}"),
            });
        }
        _ => {
            return Err(MediaError::malformed(
                Handler::Ens.as_str(),
                format!("multiple domains for labelhash {labelhash}"),
            ));
        }
    };
    let name = format!("{label}.eth");
    let svg = ens_svg(&name);

    let mut metadata = TokenMetadata::new();
    metadata.insert("name".into(), Value::String(format!("ENS: {name}")));
    metadata.insert("description".into(), Value::String(ENS_DESCRIPTION.to_string()));
    metadata.insert("image".into(), Value::String(glyph::svg_data_uri(&svg)));
    metadata.insert(
        "profile_image".into(),
        Value::String(format!("{ENS_AVATAR_BASE}/{name}")),
    );
    Ok(metadata)
}

fn ens_svg(name: &str) -> String {
    let size = ENS_CANVAS;
    let center = size / 2;
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}">"#,
            r#"<rect x="0" y="0" width="{size}" height="{size}" style="fill:rgb(255,255,255)"/>"#,
            r#"<text x="{center}" y="{center}" font-size="16px" text-anchor="middle" alignment-baseline="middle" font-family="Helvetica Neue">{name}</text>"#,
            "</svg>"
        ),
        size = size,
        center = center,
        name = escape_text(name),
    )
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

async fn punk_metadata(
    ctx: &SynthesisContext,
    token_id: U256,
) -> Result<TokenMetadata, MediaError> {
    if token_id > U256::from(u16::MAX) {
        return Err(MediaError::malformed(
            Handler::Cryptopunk.as_str(),
            format!("punk index {token_id} out of range"),
        ));
    }
    let punk_index = token_id.low_u32() as u16;
    let svg = ctx.chain.punk_image_svg(punk_index).await?;
    let svg = svg.strip_prefix(PUNK_SVG_PREFIX).unwrap_or(&svg);
    let image = format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg)
    );

    let mut metadata = TokenMetadata::new();
    metadata.insert("name".into(), Value::String(format!("Cryptopunks: {token_id}")));
    metadata.insert("description".into(), Value::String(PUNK_DESCRIPTION.to_string()));
    metadata.insert("image".into(), Value::String(image));
    Ok(metadata)
}

async fn zora_metadata(
    ctx: &SynthesisContext,
    token: &TokenIdentifier,
    deadline: Instant,
) -> Result<TokenMetadata, MediaError> {
    let handler = Handler::Zora.as_str();
    let metadata_uri = ctx.chain.token_metadata_uri(token).await?;
    let body = ctx.body.fetch_body(&metadata_uri).await?;
    let source: TokenMetadata = serde_json::from_slice(&body).map_err(|err| {
        MediaError::malformed(handler, format!("metadata at {metadata_uri}: {err}"))
    })?;

    let mut metadata = TokenMetadata::new();
    if let Some(name) = first_string(&source, &ZORA_NAME_KEYS) {
        metadata.insert("name".into(), Value::String(name.to_string()));
    }
    if let Some(description) = first_string(&source, &ZORA_DESCRIPTION_KEYS) {
        metadata.insert("description".into(), Value::String(description.to_string()));
    }

    let media_uri = ctx.chain.token_uri(token).await?;
    let kind = match first_string(&source, &ZORA_MIME_KEYS) {
        Some(mime) => MediaKind::from_content_type(mime),
        None => match ctx.prober.probe(&media_uri, deadline).await {
            Ok(probed) => probed.kind,
            Err(MediaError::DeadlineExceeded) => return Err(MediaError::DeadlineExceeded),
            Err(err) => {
                warn!(error = %err, uri = %media_uri, "zora media probe failed");
                MediaKind::Unknown
            }
        },
    };
    if kind.is_image_like() {
        metadata.insert("image".into(), Value::String(media_uri));
    } else {
        metadata.insert("animation_url".into(), Value::String(media_uri));
        if let Some(thumbnail) = first_string(&source, &ZORA_THUMBNAIL_KEYS) {
            metadata.insert("image".into(), Value::String(thumbnail.to_string()));
        }
    }

    for (key, value) in source {
        if ZORA_REPLACED_KEYS.contains(&key.as_str()) {
            continue;
        }
        metadata.insert(key, value);
    }
    Ok(metadata)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capabilities::testing::{FakeBody, FakeChain, FakeGraph};
    use crate::probe::testing::{FakeHeaders, prober};
    use serde_json::json;
    use std::time::Duration;

    pub(crate) fn context(chain: FakeChain, graph: FakeGraph, body: FakeBody) -> SynthesisContext {
        SynthesisContext {
            chain: Arc::new(chain),
            graph: Arc::new(graph),
            body: Arc::new(body),
            prober: prober(
                Arc::new(FakeHeaders::default()),
                Arc::new(FakeHeaders::default()),
            ),
        }
    }

    fn token(address: &str, id: u64) -> TokenIdentifier {
        TokenIdentifier::new(address, Chain::Ethereum, U256::from(id)).unwrap()
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn decode_image(metadata: &TokenMetadata) -> String {
        let encoded = metadata["image"]
            .as_str()
            .unwrap()
            .strip_prefix("data:image/svg+xml;base64,")
            .unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn lookup_is_exact_and_ethereum_only() {
        assert_eq!(
            Handler::lookup(AUTOGLYPHS_ADDRESS, Chain::Ethereum),
            Some(Handler::Autoglyph)
        );
        assert_eq!(
            Handler::lookup(&CRYPTOPUNKS_ADDRESS.to_uppercase(), Chain::Ethereum),
            Some(Handler::Cryptopunk)
        );
        assert_eq!(Handler::lookup(ZORA_ADDRESS, Chain::Polygon), None);
        assert_eq!(
            Handler::lookup("0x0000000000000000000000000000000000000001", Chain::Ethereum),
            None
        );
    }

    #[tokio::test]
    async fn unregistered_contract_is_a_fallback() {
        let ctx = context(FakeChain::default(), FakeGraph::default(), FakeBody::default());
        let err = Handler::synthesize_for(
            &ctx,
            &token("0x0000000000000000000000000000000000000001", 1),
            far(),
        )
        .await
        .unwrap_err();
        assert!(err.is_fallback());
    }

    #[tokio::test]
    async fn autoglyph_reads_token_uri() {
        let subject = token(AUTOGLYPHS_ADDRESS, 1);
        let mut chain = FakeChain::default();
        chain.token_uris.insert(
            subject.to_string(),
            format!("data:text/plain;charset=utf-8,{}", "O".repeat(glyph::GRID_CELLS)),
        );
        let ctx = context(chain, FakeGraph::default(), FakeBody::default());
        let metadata = Handler::synthesize_for(&ctx, &subject, far()).await.unwrap();
        assert_eq!(metadata["name"], "Autoglyph #1");
        assert_eq!(decode_image(&metadata).matches("<circle").count(), glyph::GRID_CELLS);
    }

    #[tokio::test]
    async fn colorglyph_short_payload_is_malformed() {
        let subject = token(COLORGLYPHS_ADDRESS, 3);
        let mut chain = FakeChain::default();
        chain
            .token_uris
            .insert(subject.to_string(), "data:,.O.O 4".to_string());
        let ctx = context(chain, FakeGraph::default(), FakeBody::default());
        let err = Handler::synthesize_for(&ctx, &subject, far()).await.unwrap_err();
        assert!(matches!(
            err,
            MediaError::MalformedOnChainPayload {
                handler: "colorglyph",
                ..
            }
        ));
    }

    #[test]
    fn labelhash_is_zero_padded_hex() {
        assert_eq!(
            ens_labelhash(U256::from(255u64)),
            format!("0x{}ff", "0".repeat(62))
        );
    }

    #[tokio::test]
    async fn ens_renders_label() {
        let graph = FakeGraph {
            response: json!({"data": {"domains": [{"labelName": "vitalik"}]}}),
            ..FakeGraph::default()
        };
        let ctx = context(FakeChain::default(), graph, FakeBody::default());
        let metadata = Handler::Ens
            .synthesize(&ctx, &token(ENS_ADDRESS, 255), far())
            .await
            .unwrap();
        assert_eq!(metadata["name"], "ENS: vitalik.eth");
        assert_eq!(
            metadata["profile_image"],
            "https://metadata.ens.domains/mainnet/avatar/vitalik.eth"
        );
        let svg = decode_image(&metadata);
        assert!(svg.contains(r#"width="240" height="240""#));
        assert!(svg.contains(r#"<text x="120" y="120""#));
        assert!(svg.contains(">vitalik.eth</text>"));
    }

    #[tokio::test]
    async fn ens_query_carries_labelhash() {
        let graph = Arc::new(FakeGraph {
            response: json!({"data": {"domains": [{"labelName": "a"}]}}),
            ..FakeGraph::default()
        });
        let ctx = SynthesisContext {
            graph: graph.clone(),
            ..context(FakeChain::default(), FakeGraph::default(), FakeBody::default())
        };
        Handler::Ens
            .synthesize(&ctx, &token(ENS_ADDRESS, 1), far())
            .await
            .unwrap();
        let query = graph.last_query.lock().unwrap().clone().unwrap();
        assert!(query.contains(&ens_labelhash(U256::one())));
        assert!(query.contains("labelName"));
    }

    async fn ens_error(graph: FakeGraph) -> MediaError {
        let ctx = context(FakeChain::default(), graph, FakeBody::default());
        Handler::Ens
            .synthesize(&ctx, &token(ENS_ADDRESS, 1), far())
            .await
            .unwrap_err()
    }

    fn graph_answering(response: Value) -> FakeGraph {
        FakeGraph {
            response,
            ..FakeGraph::default()
        }
    }

    #[tokio::test]
    async fn ens_unknown_labelhash_is_not_found() {
        let err = ens_error(graph_answering(json!({"data": {"domains": []}}))).await;
        assert!(err.is_not_found());
        assert!(err.to_string().contains(&ens_labelhash(U256::one())));
    }

    #[tokio::test]
    async fn ens_graph_failures_are_transport_errors() {
        let response = json!({"errors": [{"message": "indexer down"}]});
        let err = ens_error(graph_answering(response)).await;
        assert!(matches!(err, MediaError::Transport { .. }));
        assert!(err.to_string().contains("indexer down"));

        let err = ens_error(graph_answering(json!({"data": {"domains": "nope"}}))).await;
        assert!(matches!(err, MediaError::Transport { .. }));

        let failing = FakeGraph {
            failure: Some(MediaError::transport("https://graph.example", "connection reset")),
            ..FakeGraph::default()
        };
        let err = ens_error(failing).await;
        assert_eq!(
            err,
            MediaError::transport("https://graph.example", "connection reset")
        );
    }

    #[tokio::test]
    async fn ens_multiple_domains_is_malformed() {
        let response = json!({"data": {"domains": [{"labelName": "a"}, {"labelName": "b"}]}});
        let err = ens_error(graph_answering(response)).await;
        assert!(matches!(err, MediaError::MalformedOnChainPayload { handler: "ens", .. }));
    }

    #[tokio::test]
    async fn punk_svg_is_reencoded() {
        let mut chain = FakeChain::default();
        chain
            .punks
            .insert(7, format!("{PUNK_SVG_PREFIX}<svg></svg>"));
        let ctx = context(chain, FakeGraph::default(), FakeBody::default());
        let metadata = Handler::Cryptopunk
            .synthesize(&ctx, &token(CRYPTOPUNKS_ADDRESS, 7), far())
            .await
            .unwrap();
        assert_eq!(metadata["name"], "Cryptopunks: 7");
        assert_eq!(decode_image(&metadata), "<svg></svg>");
    }

    #[tokio::test]
    async fn punk_index_beyond_u16_is_malformed() {
        let chain = Arc::new(FakeChain::default());
        let ctx = SynthesisContext {
            chain: chain.clone(),
            ..context(FakeChain::default(), FakeGraph::default(), FakeBody::default())
        };
        let err = Handler::Cryptopunk
            .synthesize(&ctx, &token(CRYPTOPUNKS_ADDRESS, 70_000), far())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::MalformedOnChainPayload {
                handler: "cryptopunk",
                ..
            }
        ));
        assert_eq!(chain.call_count(), 0);
    }

    fn zora_setup(metadata: Value, media_uri: &str) -> (SynthesisContext, TokenIdentifier) {
        let subject = token(ZORA_ADDRESS, 9);
        let mut chain = FakeChain::default();
        chain
            .metadata_uris
            .insert(subject.to_string(), "ipfs://QmMeta".to_string());
        chain
            .token_uris
            .insert(subject.to_string(), media_uri.to_string());
        let body = FakeBody::default().with("ipfs://QmMeta", metadata.to_string());
        (context(chain, FakeGraph::default(), body), subject)
    }

    #[tokio::test]
    async fn zora_image_hint_sets_image() {
        let (ctx, subject) = zora_setup(
            json!({"title": "Sunrise", "notes": "first light", "mimeType": "image/png", "edition": 3}),
            "https://media.example/sunrise",
        );
        let metadata = Handler::Zora.synthesize(&ctx, &subject, far()).await.unwrap();
        assert_eq!(metadata["name"], "Sunrise");
        assert_eq!(metadata["description"], "first light");
        assert_eq!(metadata["image"], "https://media.example/sunrise");
        assert!(metadata.get("animation_url").is_none());
        assert_eq!(metadata["edition"], 3);
        assert_eq!(metadata["mimeType"], "image/png");
    }

    #[tokio::test]
    async fn zora_probes_without_hint_and_uses_thumbnail() {
        let (ctx, subject) = zora_setup(
            json!({"name": "Loop", "description": "d", "thumbnail": "https://media.example/thumb.png", "image": ""}),
            "https://media.example/loop.mp4",
        );
        let metadata = Handler::Zora.synthesize(&ctx, &subject, far()).await.unwrap();
        assert_eq!(metadata["animation_url"], "https://media.example/loop.mp4");
        assert_eq!(metadata["image"], "https://media.example/thumb.png");
        assert_eq!(metadata["name"], "Loop");
    }

    #[tokio::test]
    async fn zora_missing_metadata_body_propagates() {
        let subject = token(ZORA_ADDRESS, 9);
        let mut chain = FakeChain::default();
        chain
            .metadata_uris
            .insert(subject.to_string(), "ipfs://QmGone".to_string());
        let ctx = context(chain, FakeGraph::default(), FakeBody::default());
        let err = Handler::Zora.synthesize(&ctx, &subject, far()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
