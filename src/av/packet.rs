use bytes::Bytes;

use crate::codec::aac::AACConfig;
use crate::codec::h264::NALUnit;

/// One H.264 access unit as delivered by the transport stream reader.
///
/// Timestamps are raw 33-bit 90 kHz values until the pipeline normalizes them.
#[derive(Debug, Clone)]
pub struct VideoAccessUnit {
    pub nalus: Vec<Bytes>,
    pub pts: i64,
    pub dts: Option<i64>,
}

impl VideoAccessUnit {
    pub fn new(nalus: Vec<Bytes>) -> Self {
        Self {
            nalus,
            pts: 0,
            dts: None,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Decode timestamp, falling back to the presentation timestamp.
    pub fn decode_ts(&self) -> i64 {
        self.dts.unwrap_or(self.pts)
    }

    pub fn is_idr(&self) -> bool {
        self.nalus
            .iter()
            .filter_map(|n| NALUnit::new(n.clone()))
            .any(|n| n.is_idr())
    }
}

/// A batch of raw AAC frames sharing one PES header.
#[derive(Debug, Clone)]
pub struct AudioAccessUnits {
    pub config: AACConfig,
    pub frames: Vec<Bytes>,
    pub pts: i64,
}

impl AudioAccessUnits {
    pub fn new(config: AACConfig, frames: Vec<Bytes>) -> Self {
        Self {
            config,
            frames,
            pts: 0,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }
}
