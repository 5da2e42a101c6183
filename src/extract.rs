use crate::error::MediaError;
use crate::media::MediaKind;
use crate::token::{Chain, TokenMetadata};
use serde_json::Value;
use tracing::debug;

/// How deep into nested metadata a keyword search descends.
pub const DEFAULT_SEARCH_DEPTH: usize = 5;

const HIC_ET_NUNC: &str = "KT1RJ6PbjHpwc3M5rw5s2Nbmefwbuwbdxton";
const FX_HASH: &str = "KT1KEa8z6vWXDJrVqtMrAeDVzsvxat3kHaCE";
const FX_HASH_V2: &str = "KT1U6EHmNxJTkvaWJ4ThczG4FSDaHC21ssvi";

/// Ordered image/animation keyword lists for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPaths {
    pub image: Vec<String>,
    pub animation: Vec<String>,
}

impl KeywordPaths {
    pub fn new<I, A>(image: I, animation: A) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            image: image.into_iter().map(Into::into).collect(),
            animation: animation.into_iter().map(Into::into).collect(),
        }
    }
}

/// Chain-level keyword defaults with optional operator overrides.
#[derive(Debug, Clone, Default)]
pub struct KeywordConfig {
    image_override: Option<Vec<String>>,
    animation_override: Option<Vec<String>>,
}

impl KeywordConfig {
    pub fn new(
        image_override: Option<Vec<String>>,
        animation_override: Option<Vec<String>>,
    ) -> Self {
        Self {
            image_override,
            animation_override,
        }
    }

    pub fn for_chain(&self, chain: Chain) -> KeywordPaths {
        let (image, animation) = base_keywords(chain);
        KeywordPaths {
            image: self
                .image_override
                .clone()
                .unwrap_or_else(|| to_owned(image)),
            animation: self
                .animation_override
                .clone()
                .unwrap_or_else(|| to_owned(animation)),
        }
    }

    /// Keywords for a specific contract; some Tezos contracts store their
    /// primary asset under a different key than the chain default.
    pub fn for_token(&self, chain: Chain, contract_address: &str) -> KeywordPaths {
        let mut paths = self.for_chain(chain);
        if chain != Chain::Tezos {
            return paths;
        }
        match contract_address {
            HIC_ET_NUNC => {
                paths.image = to_owned(&["artifactUri", "displayUri", "image"]);
            }
            FX_HASH | FX_HASH_V2 => {
                paths.image = to_owned(&["displayUri", "artifactUri", "image", "uri"]);
                paths.animation = to_owned(&["artifactUri", "displayUri"]);
            }
            _ => {}
        }
        paths
    }
}

fn base_keywords(chain: Chain) -> (&'static [&'static str], &'static [&'static str]) {
    match chain {
        Chain::Tezos => (
            &["displayUri", "image", "thumbnailUri", "artifactUri", "uri"],
            &["artifactUri", "displayUri", "uri", "image"],
        ),
        _ => (&["image"], &["animation_url", "animation", "video"]),
    }
}

fn to_owned(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|keyword| keyword.to_string()).collect()
}

/// Candidate URLs for the two media slots, with the keyword that produced each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaUrls {
    pub image: Option<String>,
    pub image_keyword: Option<String>,
    pub animation: Option<String>,
    pub animation_keyword: Option<String>,
}

/// Locates image and animation candidates in arbitrarily shaped metadata.
pub fn extract_media_urls(
    metadata: &TokenMetadata,
    keywords: &KeywordPaths,
) -> Result<MediaUrls, MediaError> {
    let mut urls = MediaUrls::default();

    if let Some(Value::Object(media)) = metadata.get("media") {
        let kind = media
            .get("mimeType")
            .and_then(Value::as_str)
            .map(MediaKind::from_content_type)
            .unwrap_or(MediaKind::Unknown);
        if let Some(uri) = media.get("uri").and_then(Value::as_str).filter(|uri| !uri.is_empty()) {
            debug!(uri, kind = %kind, "seeding from media block");
            if kind.is_image_like() {
                urls.image = Some(uri.to_string());
                urls.image_keyword = Some("media".to_string());
            } else {
                urls.animation = Some(uri.to_string());
                urls.animation_keyword = Some("media".to_string());
            }
        }
    }

    for keyword in &keywords.image {
        if let Some(found) = find_string(metadata, keyword, DEFAULT_SEARCH_DEPTH) {
            debug!(keyword = %keyword, url = %found, "found image url");
            urls.image = Some(found.to_string());
            urls.image_keyword = Some(keyword.clone());
            break;
        }
    }

    for keyword in &keywords.animation {
        let Some(found) = find_string(metadata, keyword, DEFAULT_SEARCH_DEPTH) else {
            continue;
        };
        if urls.image.as_deref() == Some(found) {
            continue;
        }
        debug!(keyword = %keyword, url = %found, "found animation url");
        urls.animation = Some(found.to_string());
        urls.animation_keyword = Some(keyword.clone());
        break;
    }

    if urls.image.is_none() && urls.animation.is_none() {
        return Err(MediaError::NoMediaUrlsFound);
    }
    Ok(urls)
}

/// First `name` and `description` strings anywhere in the metadata.
pub fn find_name_and_description(metadata: &TokenMetadata) -> (String, String) {
    let name = find_string(metadata, "name", DEFAULT_SEARCH_DEPTH).unwrap_or_default();
    let description =
        find_string(metadata, "description", DEFAULT_SEARCH_DEPTH).unwrap_or_default();
    (name.to_string(), description.to_string())
}

/// First non-empty string value among `keys`, checked in order at the top level.
pub fn first_string<'a>(metadata: &'a TokenMetadata, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        metadata
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    })
}

/// Depth-first search for a non-empty string under `keyword`.
///
/// At each level an exact key match is preferred, then a case-insensitive key
/// containing the keyword whose value is a URI (`image` matches `image_url`
/// but not a free-text `image_details`), then nested objects and arrays are
/// searched in key order.
pub fn find_string<'a>(
    metadata: &'a TokenMetadata,
    keyword: &str,
    depth: usize,
) -> Option<&'a str> {
    if depth == 0 || keyword.is_empty() {
        return None;
    }
    if let Some(found) = metadata.get(keyword).and_then(non_empty_str) {
        return Some(found);
    }
    let needle = keyword.to_ascii_lowercase();
    for (key, value) in metadata {
        if key.to_ascii_lowercase().contains(&needle) {
            if let Some(found) = non_empty_str(value).filter(|found| looks_like_uri(found)) {
                return Some(found);
            }
        }
    }
    for value in metadata.values() {
        if let Some(found) = find_in_value(value, keyword, depth - 1) {
            return Some(found);
        }
    }
    None
}

fn find_in_value<'a>(value: &'a Value, keyword: &str, depth: usize) -> Option<&'a str> {
    match value {
        Value::Object(map) => find_string(map, keyword, depth),
        Value::Array(items) if depth > 0 => items
            .iter()
            .find_map(|item| find_in_value(item, keyword, depth - 1)),
        _ => None,
    }
}

fn looks_like_uri(value: &str) -> bool {
    value.contains("://") || value.starts_with("data:") || value.starts_with("/ipfs/")
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value
        .as_str()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> TokenMetadata {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn image_only_metadata() {
        let meta = metadata(json!({"image": "https://x/a.png"}));
        let keywords = KeywordPaths::new(["image"], Vec::<String>::new());
        let urls = extract_media_urls(&meta, &keywords).unwrap();
        assert_eq!(urls.image.as_deref(), Some("https://x/a.png"));
        assert_eq!(urls.image_keyword.as_deref(), Some("image"));
        assert_eq!(urls.animation, None);
    }

    #[test]
    fn earlier_keyword_wins_regardless_of_tree_position() {
        let keywords = KeywordPaths::new(
            ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"],
            Vec::<String>::new(),
        );
        let meta = metadata(json!({
            "a": {"k7": "https://x/seven.png"},
            "z": {"deep": {"k3": "https://x/three.png"}},
        }));
        for _ in 0..10 {
            let urls = extract_media_urls(&meta, &keywords).unwrap();
            assert_eq!(urls.image.as_deref(), Some("https://x/three.png"));
            assert_eq!(urls.image_keyword.as_deref(), Some("k3"));
        }
    }

    #[test]
    fn animation_skips_value_equal_to_image() {
        let meta = metadata(json!({
            "image": "https://x/same.mp4",
            "animation": "https://x/same.mp4",
            "video": "https://x/other.mp4",
        }));
        let keywords = KeywordPaths::new(["image"], ["animation", "video"]);
        let urls = extract_media_urls(&meta, &keywords).unwrap();
        assert_eq!(urls.image.as_deref(), Some("https://x/same.mp4"));
        assert_eq!(urls.animation.as_deref(), Some("https://x/other.mp4"));
        assert_eq!(urls.animation_keyword.as_deref(), Some("video"));
    }

    #[test]
    fn animation_keyword_matches_animation_url() {
        let meta = metadata(json!({
            "image": "https://x/video.mp4",
            "animation_url": "https://x/pic.png",
        }));
        let keywords = KeywordConfig::default().for_chain(Chain::Ethereum);
        let urls = extract_media_urls(&meta, &keywords).unwrap();
        assert_eq!(urls.animation.as_deref(), Some("https://x/pic.png"));
    }

    #[test]
    fn key_containing_keyword_needs_a_uri_value() {
        let meta = metadata(json!({
            "image_details": "a square canvas",
            "imageUrl": "ipfs://QmPic/1.png",
        }));
        assert_eq!(
            find_string(&meta, "image", DEFAULT_SEARCH_DEPTH),
            Some("ipfs://QmPic/1.png")
        );
        let free_text = metadata(json!({"image_details": "a square canvas"}));
        assert_eq!(find_string(&free_text, "image", DEFAULT_SEARCH_DEPTH), None);
    }

    #[test]
    fn default_animation_keywords_prefer_animation_url() {
        let paths = KeywordConfig::default().for_chain(Chain::Ethereum);
        assert_eq!(paths.animation, vec!["animation_url", "animation", "video"]);
        let meta = metadata(json!({
            "animation": "https://x/second.mp4",
            "animation_url": "https://x/first.mp4",
        }));
        let urls = extract_media_urls(&meta, &paths).unwrap();
        assert_eq!(urls.animation.as_deref(), Some("https://x/first.mp4"));
        assert_eq!(urls.animation_keyword.as_deref(), Some("animation_url"));
    }

    #[test]
    fn media_block_seeds_slots() {
        let meta = metadata(json!({
            "media": {"mimeType": "video/mp4", "uri": "ipfs://QmVideo"},
        }));
        let urls = extract_media_urls(&meta, &KeywordPaths::new(["image"], ["animation"])).unwrap();
        assert_eq!(urls.animation.as_deref(), Some("ipfs://QmVideo"));
        assert_eq!(urls.image, None);

        let meta = metadata(json!({
            "media": {"mimeType": "image/png", "uri": "ipfs://QmPic"},
        }));
        let urls = extract_media_urls(&meta, &KeywordPaths::new(["image"], ["animation"])).unwrap();
        assert_eq!(urls.image.as_deref(), Some("ipfs://QmPic"));
    }

    #[test]
    fn keyword_match_overrides_media_block() {
        let meta = metadata(json!({
            "media": {"mimeType": "image/png", "uri": "ipfs://QmPic"},
            "image": "https://x/override.png",
        }));
        let urls = extract_media_urls(&meta, &KeywordPaths::new(["image"], ["animation"])).unwrap();
        assert_eq!(urls.image.as_deref(), Some("https://x/override.png"));
    }

    #[test]
    fn nothing_found_is_terminal() {
        let meta = metadata(json!({"name": "nothing", "image": ""}));
        let keywords = KeywordPaths::new(["image"], ["animation"]);
        let err = extract_media_urls(&meta, &keywords).unwrap_err();
        assert_eq!(err, MediaError::NoMediaUrlsFound);
    }

    #[test]
    fn search_depth_is_bounded() {
        let meta = metadata(json!({
            "a": {"b": {"c": {"d": {"e": {"f": {"image": "https://x/deep.png"}}}}}}
        }));
        assert_eq!(find_string(&meta, "image", DEFAULT_SEARCH_DEPTH), None);
        let shallow = metadata(json!({"a": {"b": {"image": "https://x/ok.png"}}}));
        assert_eq!(
            find_string(&shallow, "image", DEFAULT_SEARCH_DEPTH),
            Some("https://x/ok.png")
        );
    }

    #[test]
    fn tezos_contract_overrides() {
        let config = KeywordConfig::default();
        let hen = config.for_token(Chain::Tezos, HIC_ET_NUNC);
        assert_eq!(hen.image, vec!["artifactUri", "displayUri", "image"]);
        let fx = config.for_token(Chain::Tezos, FX_HASH_V2);
        assert_eq!(fx.animation, vec!["artifactUri", "displayUri"]);
        let eth = config.for_token(Chain::Ethereum, HIC_ET_NUNC);
        assert_eq!(eth.image, vec!["image"]);
    }

    #[test]
    fn env_overrides_replace_chain_defaults() {
        let config = KeywordConfig::new(Some(vec!["image_url".to_string()]), None);
        let paths = config.for_chain(Chain::Base);
        assert_eq!(paths.image, vec!["image_url"]);
        assert_eq!(paths.animation, vec!["animation_url", "animation", "video"]);
    }

    #[test]
    fn name_and_description_are_searched() {
        let meta = metadata(json!({"properties": {"name": "Nested", "description": "Deep"}}));
        assert_eq!(
            find_name_and_description(&meta),
            ("Nested".to_string(), "Deep".to_string())
        );
    }
}
