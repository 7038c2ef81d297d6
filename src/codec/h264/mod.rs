//! # H.264/AVC Bitstream Handling
//!
//! What the repackager needs from H.264 without decoding pictures:
//!
//! - Annex-B splitting and joining of NAL units
//! - NAL unit classification (IDR detection for segment boundaries)
//! - SPS parsing for the coded picture size and the RFC 6381 codec string
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use udphls::codec::h264::{split_annexb, H264Parser};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pes_payload = Bytes::from_static(&[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 1, 0x65, 0x88]);
//! let mut parser = H264Parser::new();
//! for unit in split_annexb(&pes_payload) {
//!     if let Some(nalu) = parser.parse_nalu(&unit)? {
//!         println!("NAL type {:?}, IDR: {}", nalu.nal_type, nalu.is_idr());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Annex-B framing and parameter set parsing
pub mod parser;
/// NAL unit and SPS types
pub mod types;

#[cfg(test)]
mod parser_test;

#[doc(inline)]
pub use parser::*;
#[doc(inline)]
pub use types::*;
