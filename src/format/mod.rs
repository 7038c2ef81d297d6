use crate::av::{AudioAccessUnits, Track, VideoAccessUnit};
use crate::Result;

pub mod hls;
pub mod ts;
pub mod udp;

/// Receiver of demultiplexed access units
///
/// The transport stream reader calls it in demux order, one access unit at a
/// time, with timestamps still in raw 33-bit form.
#[async_trait::async_trait]
pub trait AccessUnitSink: Send {
    /// Handle one H.264 access unit
    async fn on_video(&mut self, track: &Track, unit: VideoAccessUnit) -> Result<()>;

    /// Handle the AAC frames of one PES packet
    async fn on_audio(&mut self, track: &Track, unit: AudioAccessUnits) -> Result<()>;
}

pub use self::hls::{Packager, PackagerConfig, VariantRegistry};
pub use self::ts::{TSMuxer, TSReader};
pub use self::udp::UdpSource;
