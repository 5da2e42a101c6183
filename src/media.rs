use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of media kinds a token asset can resolve to.
///
/// `Unknown` means the kind has not been determined yet; `Invalid` means it
/// was determined and found unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Svg,
    Gif,
    Video,
    Audio,
    Pdf,
    Html,
    Animation,
    Text,
    Unknown,
    Invalid,
}

/// Richness priority, richest first. Kinds earlier in the list belong in the
/// animation slot when competing with kinds later in the list.
const RICHNESS_PRIORITY: [MediaKind; 11] = [
    MediaKind::Html,
    MediaKind::Audio,
    MediaKind::Animation,
    MediaKind::Video,
    MediaKind::Gif,
    MediaKind::Svg,
    MediaKind::Image,
    MediaKind::Pdf,
    MediaKind::Text,
    MediaKind::Unknown,
    MediaKind::Invalid,
];

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Svg => "svg",
            MediaKind::Gif => "gif",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Pdf => "pdf",
            MediaKind::Html => "html",
            MediaKind::Animation => "animation",
            MediaKind::Text => "text",
            MediaKind::Unknown => "unknown",
            MediaKind::Invalid => "invalid",
        }
    }

    fn priority_rank(&self) -> usize {
        RICHNESS_PRIORITY
            .iter()
            .position(|kind| kind == self)
            .unwrap_or(RICHNESS_PRIORITY.len())
    }

    /// True when `self` is strictly richer than `other`.
    pub fn outranks(&self, other: MediaKind) -> bool {
        self.priority_rank() < other.priority_rank()
    }

    pub fn is_animation_like(&self) -> bool {
        matches!(
            self,
            MediaKind::Video | MediaKind::Html | MediaKind::Audio | MediaKind::Animation
        )
    }

    pub fn is_image_like(&self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::Gif | MediaKind::Svg)
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, MediaKind::Unknown | MediaKind::Invalid)
    }

    /// Maps a transport content type to a kind. Total: anything that does not
    /// parse as `type/subtype` is `Unknown`.
    pub fn from_content_type(content_type: &str) -> MediaKind {
        let essence = strip_content_type_params(content_type).to_ascii_lowercase();
        let Some((top, sub)) = essence.split_once('/') else {
            return MediaKind::Unknown;
        };
        if sub.is_empty() {
            return MediaKind::Unknown;
        }
        match top {
            "image" => match sub {
                "svg" | "svg+xml" => MediaKind::Svg,
                "gif" => MediaKind::Gif,
                _ => MediaKind::Image,
            },
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            "text" => match sub {
                "html" => MediaKind::Html,
                _ => MediaKind::Text,
            },
            "application" => match sub {
                "pdf" => MediaKind::Pdf,
                _ => MediaKind::Unknown,
            },
            "model" => match sub {
                "gltf-binary" | "gltf+json" | "gltf+binary" => MediaKind::Animation,
                _ => MediaKind::Unknown,
            },
            _ => MediaKind::Unknown,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drops MIME parameters (`; charset=...`) and surrounding whitespace.
pub fn strip_content_type_params(content_type: &str) -> &str {
    let trimmed = content_type.trim();
    match trimmed.split_once(';') {
        Some((essence, _)) => essence.trim(),
        None => trimmed,
    }
}

const EXTENSIONS: [(&str, MediaKind, &str); 15] = [
    ("jpg", MediaKind::Image, "image/jpeg"),
    ("jpeg", MediaKind::Image, "image/jpeg"),
    ("png", MediaKind::Image, "image/png"),
    ("webp", MediaKind::Image, "image/webp"),
    ("gif", MediaKind::Gif, "image/gif"),
    ("mp4", MediaKind::Video, "video/mp4"),
    ("webm", MediaKind::Video, "video/webm"),
    ("mov", MediaKind::Video, "video/quicktime"),
    ("mp3", MediaKind::Audio, "audio/mpeg"),
    ("wav", MediaKind::Audio, "audio/wav"),
    ("glb", MediaKind::Animation, "model/gltf-binary"),
    ("gltf", MediaKind::Animation, "model/gltf+json"),
    ("svg", MediaKind::Svg, "image/svg+xml"),
    ("pdf", MediaKind::Pdf, "application/pdf"),
    ("html", MediaKind::Html, "text/html"),
];

/// Looks up the trailing file extension of a URL, ignoring any query string.
pub fn kind_from_extension(url: &str) -> Option<(MediaKind, &'static str)> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let (_, ext) = path.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    EXTENSIONS
        .iter()
        .find(|(candidate, _, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|(_, kind, content_type)| (*kind, *content_type))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

/// A resolved media reference. Only the dimension enricher adds dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub kind: MediaKind,
    pub content_type: String,
    pub primary_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl MediaRecord {
    pub fn with_dimensions(&self, dimensions: Dimensions) -> Self {
        Self {
            dimensions: Some(dimensions),
            ..self.clone()
        }
    }
}
