#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # udphls - MPEG-TS over UDP to HLS
//!
//! `udphls` listens on any number of UDP sockets carrying MPEG transport
//! streams and republishes every feed as an independent HTTP Live Streaming
//! variant, together with a master playlist that lists all of them.
//!
//! ## Features
//!
//! - Unicast and IPv4 multicast UDP ingest
//! - Transport stream demultiplexing with resynchronization on corrupt input
//! - 33-bit PTS/DTS normalization across rollovers
//! - H.264 video and AAC audio segmenting into MPEG-TS HLS segments
//! - In-memory or on-disk segment storage with a per-variant ceiling
//! - One task per feed; a failing feed never stops the others
//!
//! ## Quick Start
//!
//! ```bash
//! udphls --udps "udp://239.0.0.1:9000|low|640x360|200000,udp://239.0.0.1:9001|high|1280x720|1000000"
//! ```
//!
//! Then open `http://localhost:8080/` or point a player at
//! `http://localhost:8080/video.m3u8`.
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use udphls::config::{Config, Overrides};
//!
//! #[tokio::main]
//! async fn main() -> udphls::Result<()> {
//!     let config = Config::load(
//!         None,
//!         Overrides {
//!             feeds: Some("127.0.0.1:9000|cam|1280x720|1000000".into()),
//!             ..Default::default()
//!         },
//!     )?;
//!     udphls::app::run(config, CancellationToken::new()).await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: access unit types and timestamp normalization
//! - `codec`: H.264 NAL unit and AAC ADTS parsing
//! - `format`: UDP source, transport stream reader and muxer, HLS packaging
//! - `supervisor`: per-feed pipelines and their lifecycle
//! - `server`: HTTP routing
//! - `config`: layered configuration
//! - `utils`: bit reading and CRC helpers

/// Audio/Video base types and utilities
pub mod av;

/// Process orchestration
pub mod app;

/// Codec implementations for video and audio formats
pub mod codec;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Media format implementations (UDP, TS, HLS)
pub mod format;

/// HTTP front end
pub mod server;

/// Feed pipelines
pub mod supervisor;

/// Common utilities and helper functions
pub mod utils;

pub use error::{Result, UdpHlsError};
