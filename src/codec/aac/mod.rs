//! AAC audio carried as ADTS inside MPEG-TS.

/// ADTS header parsing and frame splitting
pub mod parser;
/// AAC configuration and ADTS header types
pub mod types;

pub use parser::{AACParser, ADTSFrames};
pub use types::{AACConfig, ADTSHeader, ProfileType, ADTS_HEADER_SIZE};
