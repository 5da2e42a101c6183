//! Colorglyphs: Autoglyph grids recoloured from the creator's address.
//!
//! The creator address (without `0x`) yields 35 overlapping six-digit RGB
//! chunks. Named colours are picked from those chunks by successive stable
//! sorts over one shared list, so ties resolve by the previous ordering.

use crate::error::MediaError;
use crate::glyph::{self, GlyphStyle, Rgb, WHITE};
use crate::token::TokenMetadata;
use ethers::types::U256;
use serde_json::Value;
use std::cmp::Reverse;

pub const ADDRESS_CHUNKS: usize = 35;
pub const BLACK: Rgb = Rgb::new(2, 4, 8);

const HANDLER: &str = "colorglyph";
const CHUNK_LEN: usize = 6;

/// Colours derived from one creator address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPalette {
    /// Five lightest chunks, lightest first.
    pub lightest: [Rgb; 5],
    pub darkest: Rgb,
    pub reddest: Rgb,
    pub orangest: Rgb,
    pub yellowest: Rgb,
    pub greenest: Rgb,
    pub bluest: Rgb,
}

impl AddressPalette {
    pub fn derive(mut colors: Vec<Rgb>) -> Option<Self> {
        if colors.len() < 5 {
            return None;
        }
        let (r, g, b) = (
            |c: &Rgb| i32::from(c.r),
            |c: &Rgb| i32::from(c.g),
            |c: &Rgb| i32::from(c.b),
        );

        colors.sort_by_key(|c| Reverse(r(c) + g(c) + b(c)));
        let lightest = [colors[0], colors[1], colors[2], colors[3], colors[4]];
        let darkest = colors[colors.len() - 1];

        colors.sort_by_key(|c| r(c) - g(c) - b(c));
        let reddest = colors[0];
        colors.sort_by_key(|c| Reverse(r(c) - b(c)));
        let orangest = colors[0];
        colors.sort_by_key(|c| Reverse(r(c) + g(c) - b(c)));
        let yellowest = colors[0];
        colors.sort_by_key(|c| Reverse(g(c) - r(c) - b(c)));
        let greenest = colors[0];
        colors.sort_by_key(|c| Reverse(b(c) - g(c) - r(c)));
        let bluest = colors[0];

        Some(Self {
            lightest,
            darkest,
            reddest,
            orangest,
            yellowest,
            greenest,
            bluest,
        })
    }

    /// Stroke palette and background for schemes 1 through 10.
    pub fn scheme(&self, scheme: u8) -> Option<(Vec<Rgb>, Rgb)> {
        let [l1, l2, l3, l4, l5] = self.lightest;
        let scheme = match scheme {
            1 => (vec![l1, l3, l5], BLACK),
            2 => (vec![l1, l2, l3, l4], BLACK),
            3 => (vec![self.reddest, self.orangest, self.yellowest], BLACK),
            4 => (
                vec![self.reddest, self.yellowest, self.greenest, WHITE],
                BLACK,
            ),
            5 => (
                vec![l1, self.reddest, self.yellowest, self.greenest, self.bluest],
                BLACK,
            ),
            6 => (vec![self.reddest, WHITE], BLACK),
            7 => (vec![self.greenest], BLACK),
            8 => (vec![l1], self.darkest),
            9 => (vec![self.greenest], self.reddest),
            10 => (
                vec![self.reddest, self.yellowest, self.bluest, l1, BLACK],
                WHITE,
            ),
            _ => return None,
        };
        Some(scheme)
    }
}

/// The 35 overlapping chunks of a creator address.
pub fn address_colors(address: &str) -> Result<Vec<Rgb>, MediaError> {
    let hex = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    (0..ADDRESS_CHUNKS)
        .map(|start| {
            let chunk = hex.get(start..start + CHUNK_LEN).ok_or_else(|| {
                MediaError::malformed(HANDLER, format!("creator address too short: {address}"))
            })?;
            let value = u32::from_str_radix(chunk, 16).map_err(|_| {
                MediaError::malformed(HANDLER, format!("invalid colour chunk {chunk}"))
            })?;
            Ok(Rgb::new(
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ))
        })
        .collect()
}

/// Colorglyph metadata from a `tokenURI` payload of the form
/// `<grid payload> <scheme> <creator address>`.
pub fn colorglyph_metadata(token_id: U256, token_uri: &str) -> Result<TokenMetadata, MediaError> {
    let parts: Vec<&str> = token_uri.split(' ').collect();
    let [grid_payload, scheme, creator] = parts.as_slice() else {
        return Err(MediaError::malformed(
            HANDLER,
            format!("expected 3 space separated parts, got {}", parts.len()),
        ));
    };
    let grid = glyph::decode_grid(HANDLER, grid_payload)?;
    let palette = AddressPalette::derive(address_colors(creator)?)
        .ok_or_else(|| MediaError::malformed(HANDLER, "not enough address colours"))?;
    let (colors, background) = scheme
        .parse::<u8>()
        .ok()
        .and_then(|number| palette.scheme(number))
        .ok_or_else(|| MediaError::malformed(HANDLER, format!("unknown colour scheme {scheme}")))?;

    let style = GlyphStyle {
        background,
        circle_width: "0.7",
    };
    let svg = glyph::render_svg(&grid, style, |index, symbol| {
        colors[(usize::from(symbol) + index) % colors.len()]
    });

    let mut metadata = TokenMetadata::new();
    metadata.insert("name".into(), Value::String(format!("Colorglyph #{token_id}")));
    metadata.insert(
        "description".into(),
        Value::String(format!(
            "A Colorglyph with color scheme {scheme}. Created by {creator}."
        )),
    );
    metadata.insert("image".into(), Value::String(glyph::svg_data_uri(&svg)));
    Ok(metadata)
}
