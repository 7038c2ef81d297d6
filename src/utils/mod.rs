//! # Utility Functions and Types
//!
//! Bit-level reading for codec headers and the CRC-32/MPEG-2 checksum that
//! protects PAT and PMT sections.
//!
//! ```rust
//! use udphls::utils::{BitReader, Crc32Mpeg2};
//!
//! let data = [0b1010_0000];
//! let mut reader = BitReader::new(&data);
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//!
//! let crc = Crc32Mpeg2::checksum(b"udphls");
//! assert_ne!(crc, 0);
//! ```

/// Bitstream reading utilities
pub mod bits;

/// CRC calculation for PSI tables
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
