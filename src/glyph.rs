//! 64x64 symbol grids and their SVG rendering.
//!
//! Each cell holds one of `. O + X | - \ / #`. The grid is laid out on a
//! 368px canvas with a 28px margin and a 5px pitch; `.` and any unrecognised
//! byte leave the cell empty.

use crate::error::MediaError;
use crate::token::TokenMetadata;
use base64::Engine;
use ethers::types::U256;
use serde_json::Value;
use std::fmt::{self, Write};

pub const GRID_SIZE: usize = 64;
pub const GRID_CELLS: usize = GRID_SIZE * GRID_SIZE;
pub const CANVAS_SIZE: u32 = 368;

const MARGIN: i32 = 28;
const PITCH: i32 = 5;
const HALF: i32 = 3;
const LINE_WIDTH: &str = "0.8";

const AUTOGLYPH_DESCRIPTION: &str = "Autoglyphs are the first “on-chain” generative art on the Ethereum blockchain. A completely self-contained mechanism for the creation and ownership of an artwork.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

pub const WHITE: Rgb = Rgb::new(255, 255, 255);
pub const INK: Rgb = Rgb::new(0, 0, 0);

/// Stroke settings that differ between the glyph families.
#[derive(Debug, Clone, Copy)]
pub struct GlyphStyle {
    pub background: Rgb,
    pub circle_width: &'static str,
}

/// Grid text following the first `,` of an on-chain `data:` payload, with
/// literal and percent-encoded newlines removed. The result always holds
/// exactly `GRID_CELLS` symbols.
pub fn decode_grid(handler: &'static str, payload: &str) -> Result<String, MediaError> {
    let (_, grid) = payload
        .split_once(',')
        .ok_or_else(|| MediaError::malformed(handler, "tokenURI has no data separator"))?;
    let grid: String = grid
        .replace("%0A", "")
        .chars()
        .filter(|ch| *ch != '\n' && *ch != '\r')
        .collect();
    if grid.len() != GRID_CELLS || !grid.is_ascii() {
        return Err(MediaError::malformed(
            handler,
            format!("expected {GRID_CELLS} grid symbols, got {}", grid.chars().count()),
        ));
    }
    Ok(grid)
}

/// Pixel centre of cell `index`.
pub fn cell_origin(index: usize) -> (i32, i32) {
    let x = (index % GRID_SIZE) as i32 * PITCH + MARGIN;
    let y = (index / GRID_SIZE) as i32 * PITCH + MARGIN;
    (x, y)
}

/// Draws every cell of `grid`; `stroke_for(index, symbol)` picks each cell's colour.
pub fn render_svg<F>(grid: &str, style: GlyphStyle, stroke_for: F) -> String
where
    F: Fn(usize, u8) -> Rgb,
{
    let mut canvas = Canvas::new(CANVAS_SIZE, style.background);
    for (index, symbol) in grid.bytes().enumerate() {
        let (x, y) = cell_origin(index);
        let stroke = stroke_for(index, symbol);
        match symbol {
            b'O' => canvas.circle(x, y, HALF - 1, stroke, style.circle_width),
            b'+' => {
                canvas.line((x - HALF, y), (x + HALF, y), stroke);
                canvas.line((x, y - HALF), (x, y + HALF), stroke);
            }
            b'X' => {
                canvas.line((x - HALF, y - HALF), (x + HALF, y + HALF), stroke);
                canvas.line((x - HALF, y + HALF), (x + HALF, y - HALF), stroke);
            }
            b'|' => canvas.line((x, y - HALF), (x, y + HALF), stroke),
            b'-' => canvas.line((x - HALF, y), (x + HALF, y), stroke),
            b'\\' => canvas.line((x - HALF, y + HALF), (x + HALF, y - HALF), stroke),
            b'/' => canvas.line((x - HALF, y - HALF), (x + HALF, y + HALF), stroke),
            b'#' => canvas.rect(x - (HALF + 1) / 2, y - HALF, HALF + 1, stroke),
            _ => {}
        }
    }
    canvas.finish()
}

/// `data:image/svg+xml;base64,` URI for rendered markup.
pub fn svg_data_uri(svg: &str) -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg)
    )
}

/// Autoglyph metadata from the contract's `tokenURI` payload.
pub fn autoglyph_metadata(token_id: U256, token_uri: &str) -> Result<TokenMetadata, MediaError> {
    let grid = decode_grid("autoglyph", token_uri)?;
    let style = GlyphStyle {
        background: WHITE,
        circle_width: "0.6",
    };
    let svg = render_svg(&grid, style, |_, _| INK);
    let mut metadata = TokenMetadata::new();
    metadata.insert("name".into(), Value::String(format!("Autoglyph #{token_id}")));
    metadata.insert(
        "description".into(),
        Value::String(AUTOGLYPH_DESCRIPTION.to_string()),
    );
    metadata.insert("image".into(), Value::String(svg_data_uri(&svg)));
    Ok(metadata)
}

struct Canvas {
    out: String,
}

impl Canvas {
    fn new(size: u32, background: Rgb) -> Self {
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}">"#
        );
        let _ = write!(
            out,
            r#"<rect x="0" y="0" width="{size}" height="{size}" style="fill:{background}"/>"#
        );
        Self { out }
    }

    fn circle(&mut self, x: i32, y: i32, r: i32, stroke: Rgb, width: &str) {
        let _ = write!(
            self.out,
            r#"<circle cx="{x}" cy="{y}" r="{r}" stroke="{stroke}" stroke-width="{width}" stroke-linecap="butt" fill="none"/>"#
        );
    }

    fn line(&mut self, from: (i32, i32), to: (i32, i32), stroke: Rgb) {
        let _ = write!(
            self.out,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{stroke}" stroke-width="{LINE_WIDTH}" stroke-linecap="square"/>"#,
            from.0, from.1, to.0, to.1
        );
    }

    fn rect(&mut self, x: i32, y: i32, side: i32, stroke: Rgb) {
        let _ = write!(
            self.out,
            r#"<rect x="{x}" y="{y}" width="{side}" height="{side}" stroke="{stroke}" stroke-width="{LINE_WIDTH}" stroke-linecap="square"/>"#
        );
    }

    fn finish(mut self) -> String {
        self.out.push_str("</svg>");
        self.out
    }
}
