/// Normalization of 33-bit transport stream timestamps
pub mod timestamp;

mod packet;
pub use packet::*;
pub use timestamp::TimestampNormalizer;

/// Elementary stream codecs the transport stream reader recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    H264,
    H265,
    AAC,
}

impl CodecType {
    pub fn is_video(&self) -> bool {
        matches!(self, CodecType::H264 | CodecType::H265)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, CodecType::AAC)
    }
}

/// An elementary stream announced by the program map table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub pid: u16,
    pub stream_type: u8,
    pub codec: CodecType,
}
