use crate::media::{MediaKind, strip_content_type_params};
use quick_xml::Reader;
use quick_xml::events::Event;

const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";
const PLAIN_TEXT: &str = "text/plain";

const GLTF_FIELDS: [&str; 16] = [
    "scene",
    "scenes",
    "nodes",
    "meshes",
    "accessors",
    "bufferViews",
    "buffers",
    "materials",
    "textures",
    "images",
    "samplers",
    "cameras",
    "skins",
    "animations",
    "extensions",
    "extras",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub kind: MediaKind,
    pub content_type: String,
}

impl Sniffed {
    fn new(kind: MediaKind, content_type: &str) -> Self {
        Self {
            kind,
            content_type: content_type.to_string(),
        }
    }
}

/// Determines the media kind of bytes already in memory. Never fails; the
/// worst case is an `Unknown` kind with a generic content type.
pub fn sniff(bytes: &[u8]) -> Sniffed {
    if has_svg_root(bytes) {
        return Sniffed::new(MediaKind::Svg, "image/svg+xml");
    }
    let detected = detect_content_type(bytes);
    let content_type = strip_content_type_params(&detected);
    if content_type == OCTET_STREAM || content_type == PLAIN_TEXT {
        if let Some(sniffed) = sniff_gltf(bytes) {
            return sniffed;
        }
    }
    Sniffed::new(MediaKind::from_content_type(content_type), content_type)
}

/// True when the first element of the document is `<svg>`. Generic sniffers
/// report SVG as text or XML, so this runs first.
pub fn has_svg_root(bytes: &[u8]) -> bool {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) | Ok(Event::Empty(elem)) => {
                return elem.local_name().as_ref().eq_ignore_ascii_case(b"svg");
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(Event::Text(text)) if !text.iter().all(u8::is_ascii_whitespace) => return false,
            Ok(_) => {}
        }
    }
}

fn detect_content_type(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.is_empty() {
        return PLAIN_TEXT.to_string();
    }
    if let Ok(format) = image::guess_format(head) {
        return format.to_mime_type().to_string();
    }
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    if looks_like_html(head) {
        return "text/html; charset=utf-8".to_string();
    }
    if looks_like_text(head) {
        return "text/plain; charset=utf-8".to_string();
    }
    OCTET_STREAM.to_string()
}

fn looks_like_html(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let lower = text.trim_start().to_ascii_lowercase();
    ["<!doctype html", "<html", "<head", "<body", "<iframe", "<script"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn looks_like_text(head: &[u8]) -> bool {
    head.iter()
        .all(|byte| !byte.is_ascii_control() || byte.is_ascii_whitespace())
}

fn sniff_gltf(bytes: &[u8]) -> Option<Sniffed> {
    if bytes.len() >= 4 && bytes[..4].eq_ignore_ascii_case(b"glTF") {
        return Some(Sniffed::new(MediaKind::Animation, "model/gltf-binary"));
    }
    let prefix = String::from_utf8_lossy(&bytes[..bytes.len().min(20)]);
    if !prefix.trim().starts_with('{') {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    if GLTF_FIELDS
        .iter()
        .any(|field| text.contains(&format!("\"{field}\"")))
    {
        return Some(Sniffed::new(MediaKind::Animation, "model/gltf+json"));
    }
    None
}
