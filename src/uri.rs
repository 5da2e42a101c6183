use anyhow::{Result, anyhow};

/// Shape of a URI that carries its payload inline rather than pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineShape {
    Json,
    Base64Json,
    Svg,
    Base64Svg,
    Base64Bmp,
    Base64Png,
    /// Any other `data:` URI, carrying its declared media type.
    Data(String),
}

/// Transport class of a media reference, derived purely from its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriScheme {
    Http,
    ContentAddressedNative,
    ContentAddressedGateway,
    LedgerNative,
    LedgerGateway,
    PeerApi,
    Inline(InlineShape),
}

const LEDGER_GATEWAY_HOSTS: [&str; 2] = ["arweave.net", "ar-io.net"];

/// Classifies a raw URI string. Returns `None` for strings with no known shape.
pub fn classify(raw: &str) -> Option<UriScheme> {
    let uri = raw.trim();
    if uri.is_empty() {
        return None;
    }
    let lower = uri.to_ascii_lowercase();

    if lower.starts_with("ipfs://") || lower.starts_with("ipfs/") || looks_like_bare_cid(uri) {
        return Some(UriScheme::ContentAddressedNative);
    }
    if lower.starts_with("ar://") || lower.starts_with("arweave://") {
        return Some(UriScheme::LedgerNative);
    }
    if lower.starts_with("data:application/json;base64,") {
        return Some(UriScheme::Inline(InlineShape::Base64Json));
    }
    if lower.starts_with("data:image/svg+xml;base64,") {
        return Some(UriScheme::Inline(InlineShape::Base64Svg));
    }
    if lower.starts_with("data:image/bmp;base64,") {
        return Some(UriScheme::Inline(InlineShape::Base64Bmp));
    }
    if lower.starts_with("data:image/png;base64,") {
        return Some(UriScheme::Inline(InlineShape::Base64Png));
    }
    if lower.contains("ipfs.io/api") {
        return Some(UriScheme::PeerApi);
    }
    if lower.contains("/ipfs/") {
        return Some(UriScheme::ContentAddressedGateway);
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        if is_ledger_gateway(&lower) {
            return Some(UriScheme::LedgerGateway);
        }
        return Some(UriScheme::Http);
    }
    if lower.starts_with('{')
        || lower.starts_with('[')
        || lower.starts_with("data:application/json")
        || lower.starts_with("data:text/plain,{")
    {
        return Some(UriScheme::Inline(InlineShape::Json));
    }
    if lower.starts_with("<svg")
        || lower.starts_with("<?xml")
        || lower.starts_with("data:image/svg+xml;utf8,")
        || lower.starts_with("data:image/svg+xml,")
    {
        return Some(UriScheme::Inline(InlineShape::Svg));
    }
    if let Some(rest) = lower.strip_prefix("data:") {
        let declared = rest.split([';', ',']).next().unwrap_or_default();
        return Some(UriScheme::Inline(InlineShape::Data(declared.to_string())));
    }
    None
}

fn looks_like_bare_cid(uri: &str) -> bool {
    (uri.starts_with("Qm") && uri.len() >= 46) || (uri.starts_with("bafy") && uri.len() >= 50)
}

fn is_ledger_gateway(lower: &str) -> bool {
    let without_scheme = lower
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = without_scheme.split(['/', '?', '#']).next().unwrap_or_default();
    LEDGER_GATEWAY_HOSTS
        .iter()
        .any(|gateway| host == *gateway || host.ends_with(&format!(".{gateway}")))
}

/// Path of a content-addressed reference relative to `/ipfs/`, e.g.
/// `QmHash/1.png` for `ipfs://QmHash/1.png` or `https://gw/ipfs/QmHash/1.png`.
pub fn content_path(uri: &str) -> String {
    let uri = uri.trim();
    if let Some(idx) = uri.find("/ipfs/") {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return uri[idx + "/ipfs/".len()..].to_string();
        }
    }
    let without_scheme = uri.strip_prefix("ipfs://").unwrap_or(uri);
    without_scheme
        .strip_prefix("ipfs/")
        .unwrap_or(without_scheme)
        .trim_start_matches('/')
        .to_string()
}

/// Path of a permanent-storage reference without its scheme.
pub fn ledger_path(uri: &str) -> String {
    let uri = uri.trim();
    uri.strip_prefix("ar://")
        .or_else(|| uri.strip_prefix("arweave://"))
        .unwrap_or(uri)
        .trim_start_matches('/')
        .to_string()
}

/// Splits an IPFS reference into its CID and a `/`-prefixed sub-path.
pub fn parse_ipfs_uri(uri: &str) -> Result<(String, String)> {
    let path = content_path(uri);
    let mut parts = path.splitn(2, '/');
    let cid = parts
        .next()
        .ok_or_else(|| anyhow!("invalid ipfs uri"))?
        .to_string();
    if !is_valid_cid(&cid) {
        return Err(anyhow!("invalid ipfs cid"));
    }
    let path = parts
        .next()
        .map(|path| format!("/{path}"))
        .unwrap_or_default();
    Ok((cid, path))
}

fn is_valid_cid(cid: &str) -> bool {
    if cid.is_empty() {
        return false;
    }
    cid.chars().all(|ch| ch.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    #[test]
    fn classifies_content_addressed() {
        assert_eq!(
            classify(&format!("ipfs://{CID}/1.png")),
            Some(UriScheme::ContentAddressedNative)
        );
        assert_eq!(classify(CID), Some(UriScheme::ContentAddressedNative));
        assert_eq!(
            classify(&format!("https://cloudflare-ipfs.com/ipfs/{CID}")),
            Some(UriScheme::ContentAddressedGateway)
        );
        assert_eq!(
            classify(&format!("https://ipfs.io/api/v0/cat?arg={CID}")),
            Some(UriScheme::PeerApi)
        );
    }

    #[test]
    fn classifies_ledger() {
        assert_eq!(classify("ar://abc123"), Some(UriScheme::LedgerNative));
        assert_eq!(classify("arweave://abc123"), Some(UriScheme::LedgerNative));
        assert_eq!(
            classify("https://arweave.net/abc123"),
            Some(UriScheme::LedgerGateway)
        );
        assert_eq!(
            classify("https://abcd.arweave.net/abc123"),
            Some(UriScheme::LedgerGateway)
        );
    }

    #[test]
    fn classifies_inline() {
        assert_eq!(
            classify("data:application/json;base64,e30="),
            Some(UriScheme::Inline(InlineShape::Base64Json))
        );
        assert_eq!(
            classify("data:image/svg+xml;base64,PHN2Zz4="),
            Some(UriScheme::Inline(InlineShape::Base64Svg))
        );
        assert_eq!(
            classify("<svg xmlns='http://www.w3.org/2000/svg'></svg>"),
            Some(UriScheme::Inline(InlineShape::Svg))
        );
        assert_eq!(
            classify(r#"{"name":"x"}"#),
            Some(UriScheme::Inline(InlineShape::Json))
        );
        assert_eq!(
            classify("data:video/mp4;base64,AAAA"),
            Some(UriScheme::Inline(InlineShape::Data("video/mp4".to_string())))
        );
    }

    #[test]
    fn classifies_http_and_unknown() {
        assert_eq!(classify("https://x/a"), Some(UriScheme::Http));
        assert_eq!(classify("http://x/a"), Some(UriScheme::Http));
        assert_eq!(classify(""), None);
        assert_eq!(classify("vitalik.eth"), None);
    }

    #[test]
    fn content_path_strips_prefixes() {
        assert_eq!(content_path(&format!("ipfs://{CID}/a.png")), format!("{CID}/a.png"));
        assert_eq!(content_path(&format!("ipfs://ipfs/{CID}")), CID);
        assert_eq!(
            content_path(&format!("https://gw.example/ipfs/{CID}/a.png")),
            format!("{CID}/a.png")
        );
        assert_eq!(ledger_path("ar://tx123/data"), "tx123/data");
    }

    #[test]
    fn parse_ipfs_uri_basic() {
        let (cid, path) = parse_ipfs_uri("ipfs://bafy123").unwrap();
        assert_eq!(cid, "bafy123");
        assert_eq!(path, "");
    }

    #[test]
    fn parse_ipfs_uri_with_path() {
        let (cid, path) = parse_ipfs_uri("ipfs://bafy123/assets/1.svg").unwrap();
        assert_eq!(cid, "bafy123");
        assert_eq!(path, "/assets/1.svg");
    }

    #[test]
    fn parse_ipfs_uri_rejects_invalid_cid() {
        assert!(parse_ipfs_uri("ipfs://bad-cid/1.png").is_err());
    }
}
