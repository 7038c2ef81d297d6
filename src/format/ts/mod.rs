//! # MPEG Transport Stream (TS)
//!
//! Both directions of the container used on the wire and in HLS segments:
//!
//! - **Reading**: [`TSReader`] resynchronizes on the sync byte, assembles
//!   PAT/PMT sections, reassembles PES packets and hands H.264 and AAC
//!   access units to an [`AccessUnitSink`](crate::format::AccessUnitSink)
//! - **Writing**: [`TSMuxer`] emits PAT/PMT and packetizes PES data for
//!   segment files, with PCR on the video PID
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use udphls::format::ts::{TSMuxer, TS_PACKET_SIZE};
//!
//! let mut muxer = TSMuxer::new(false);
//! let mut segment = BytesMut::new();
//! muxer.write_tables(&mut segment);
//! muxer.write_video(&mut segment, 90_000, 90_000, vec![0, 0, 0, 1, 0x65, 0x88], true);
//! assert_eq!(segment.len() % TS_PACKET_SIZE, 0);
//! ```

/// TS segment writer
pub mod muxer;

/// Low-level TS packet and PSI parsing
pub mod parser;

/// PES header encoding and decoding
pub mod pes;

/// Demultiplexer delivering access units
pub mod reader;

/// Core TS types and constants
pub mod types;


pub use muxer::TSMuxer;
pub use pes::{PESHeader, PESPacket};
pub use reader::TSReader;
pub use types::{
    TSHeader, PID_AUDIO, PID_PAT, PID_PMT, PID_VIDEO, STREAM_TYPE_AAC, STREAM_TYPE_H264,
    STREAM_TYPE_H265, TS_PACKET_SIZE,
};
