use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct HLSSegment {
    pub filename: String,
    pub duration: Duration,
    pub sequence_number: u64,
    /// Wall-clock arrival of the segment's first access unit.
    pub program_date_time: DateTime<Utc>,
    pub size: usize,
}

/// Live media playlist (HLS version 3).
#[derive(Debug)]
pub struct HLSPlaylist {
    pub version: u8,
    pub target_duration: Duration,
    pub media_sequence: u64,
    pub segments: VecDeque<HLSSegment>,
    pub is_endlist: bool,
}

impl HLSPlaylist {
    pub fn new(target_duration: Duration) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: VecDeque::new(),
            is_endlist: false,
        }
    }

    /// Appends a segment and evicts the oldest ones beyond `max_segments`.
    ///
    /// Returns the evicted segments so their storage can be released.
    pub fn push(&mut self, segment: HLSSegment, max_segments: usize) -> Vec<HLSSegment> {
        self.segments.push_back(segment);
        let mut evicted = Vec::new();
        while self.segments.len() > max_segments.max(1) {
            if let Some(old) = self.segments.pop_front() {
                self.media_sequence = old.sequence_number + 1;
                evicted.push(old);
            }
        }
        evicted
    }

    /// EXT-X-TARGETDURATION: the longest segment rounded up, never below the configured target.
    pub fn target_duration_secs(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.duration)
            .chain(std::iter::once(self.target_duration))
            .max()
            .map(|d| d.as_secs_f64().ceil() as u64)
            .unwrap_or(1)
            .max(1)
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(b"#EXTM3U\n").await?;
        writer
            .write_all(format!("#EXT-X-VERSION:{}\n", self.version).as_bytes())
            .await?;
        writer
            .write_all(format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration_secs()).as_bytes())
            .await?;
        writer
            .write_all(format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence).as_bytes())
            .await?;

        for segment in &self.segments {
            writer
                .write_all(
                    format!(
                        "#EXT-X-PROGRAM-DATE-TIME:{}\n",
                        segment
                            .program_date_time
                            .to_rfc3339_opts(SecondsFormat::Millis, true)
                    )
                    .as_bytes(),
                )
                .await?;
            writer
                .write_all(format!("#EXTINF:{:.5},\n", segment.duration.as_secs_f64()).as_bytes())
                .await?;
            writer.write_all(segment.filename.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }

        if self.is_endlist {
            writer.write_all(b"#EXT-X-ENDLIST\n").await?;
        }

        writer.flush().await?;
        Ok(())
    }

    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer).await?;
        Ok(buffer)
    }
}
