#![allow(clippy::collapsible_if)]

pub mod assets;
pub mod cache;
pub mod canonical;
pub mod capabilities;
pub mod chain;
pub mod colorglyph;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod extract;
pub mod failure_log;
pub mod glyph;
pub mod graph;
pub mod handlers;
pub mod media;
pub mod pipeline;
pub mod probe;
pub mod race;
pub mod sniff;
pub mod swap;
pub mod token;
pub mod uri;

pub use error::MediaError;
pub use media::{Dimensions, MediaKind, MediaRecord};
pub use pipeline::{MediaPipeline, Resolution};
pub use token::{Chain, TokenIdentifier, TokenMetadata};
