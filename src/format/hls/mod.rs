//! # HTTP Live Streaming output
//!
//! One [`Packager`] per variant turns timestamped access units into MPEG-TS
//! segments and a live media playlist. The [`VariantRegistry`] routes HTTP
//! paths to packagers and [`build_master_manifest`] lists the variants.
//!
//! ```rust
//! use std::sync::Arc;
//! use udphls::format::hls::{Packager, PackagerConfig, VariantRegistry};
//!
//! let packager = Arc::new(Packager::new(
//!     PackagerConfig::new("cam").with_variant("1280x720", 1_000_000),
//! ));
//! let registry = VariantRegistry::new();
//! registry.register("cam", packager).unwrap();
//! assert!(registry.lookup("/stream_720p.m3u8").is_some());
//! ```

/// Master playlist generation
pub mod manifest;
/// Per-variant segmenter
pub mod packager;
/// Media playlist model
pub mod playlist;
/// Name and alias based request routing
pub mod registry;
/// HTTP responses for playlists and segments
pub mod serve;

pub use manifest::build_master_manifest;
pub use packager::{Packager, PackagerConfig};
pub use playlist::{HLSPlaylist, HLSSegment};
pub use registry::VariantRegistry;
pub use serve::{PLAYLIST_CONTENT_TYPE, SEGMENT_CONTENT_TYPE};
