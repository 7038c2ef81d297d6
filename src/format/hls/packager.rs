use super::manifest::{media_playlist_name, split_resolution, variant_block};
use super::playlist::{HLSPlaylist, HLSSegment};
use crate::av::timestamp::{duration_to_ticks, ticks_to_duration, PTS_HZ};
use crate::codec::aac::AACConfig;
use crate::codec::h264::{join_annexb, H264Parser, NALUnitType, ACCESS_UNIT_DELIMITER};
use crate::error::{Result, UdpHlsError};
use crate::format::ts::TSMuxer;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Shift applied to normalized timestamps so that frames decoded before the
/// epoch (B-frames) keep non-negative output timestamps.
const TIMESTAMP_OFFSET: i64 = PTS_HZ;

pub const DEFAULT_SEGMENT_COUNT: usize = 999_999;
pub const DEFAULT_SEGMENT_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PackagerConfig {
    /// Variant name, also the prefix of segment file names.
    pub name: String,
    /// Output directory; segments stay in memory when unset.
    pub directory: Option<PathBuf>,
    /// Segments kept in the media playlist before the oldest is evicted.
    pub segment_count: usize,
    /// Minimum segment length; cuts happen on the next IDR after it.
    pub segment_duration: Duration,
    /// Declared audio codec, `None` for a video-only variant.
    pub audio: Option<AACConfig>,
    pub bandwidth: u64,
    /// `WxH` as configured for the feed.
    pub resolution: String,
}

impl PackagerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: None,
            segment_count: DEFAULT_SEGMENT_COUNT,
            segment_duration: DEFAULT_SEGMENT_DURATION,
            audio: Some(AACConfig::default()),
            bandwidth: 0,
            resolution: String::new(),
        }
    }

    pub fn with_directory(mut self, directory: Option<PathBuf>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count;
        self
    }

    pub fn with_segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = duration;
        self
    }

    pub fn with_audio(mut self, audio: Option<AACConfig>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_variant(mut self, resolution: impl Into<String>, bandwidth: u64) -> Self {
        self.resolution = resolution.into();
        self.bandwidth = bandwidth;
        self
    }

    /// Resolution label `<height>p`, used as an alias in request routing.
    pub fn label(&self) -> Option<String> {
        split_resolution(&self.resolution).map(|(_, height)| format!("{}p", height))
    }

    pub fn playlist_name(&self) -> String {
        match split_resolution(&self.resolution) {
            Some((_, height)) => media_playlist_name(height),
            None => format!("stream_{}.m3u8", self.name),
        }
    }

    fn segment_name(&self, sequence: u64) -> String {
        format!("{}_{}.ts", self.name, sequence)
    }
}

/// Where a finished segment lives.
#[derive(Debug, Clone)]
pub(crate) enum SegmentData {
    Memory(Bytes),
    File { path: PathBuf, size: usize },
}

/// What HTTP handlers read; swapped under a short write lock.
#[derive(Debug, Default)]
pub(crate) struct ServedIndex {
    pub(crate) playlist: Bytes,
    pub(crate) segments: HashMap<String, SegmentData>,
}

#[derive(Debug)]
struct OpenSegment {
    sequence: u64,
    start_dts: i64,
    last_dts: i64,
    /// DTS step between the last two access units.
    last_delta: i64,
    arrival: DateTime<Utc>,
    buf: BytesMut,
}

#[derive(Debug)]
struct WriterState {
    muxer: TSMuxer,
    h264: H264Parser,
    playlist: HLSPlaylist,
    current: Option<OpenSegment>,
    next_sequence: u64,
    audio_enabled: bool,
    closed: bool,
}

/// One HLS variant: cuts incoming access units into MPEG-TS segments and
/// serves the resulting media playlist and segments.
#[derive(Debug)]
pub struct Packager {
    config: PackagerConfig,
    started: AtomicBool,
    writer: Mutex<WriterState>,
    pub(crate) index: RwLock<ServedIndex>,
}

impl Packager {
    pub fn new(config: PackagerConfig) -> Self {
        let audio_enabled = config.audio.is_some();
        let writer = WriterState {
            muxer: TSMuxer::new(audio_enabled),
            h264: H264Parser::new(),
            playlist: HLSPlaylist::new(config.segment_duration),
            current: None,
            next_sequence: 0,
            audio_enabled,
            closed: false,
        };
        Self {
            config,
            started: AtomicBool::new(false),
            writer: Mutex::new(writer),
            index: RwLock::new(ServedIndex::default()),
        }
    }

    pub fn config(&self) -> &PackagerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn label(&self) -> Option<String> {
        self.config.label()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The variant's stream-info block, `None` when its resolution is malformed.
    pub fn manifest_fragment(&self) -> Option<String> {
        variant_block(self.config.bandwidth, &self.config.resolution)
    }

    /// Creates the output location and publishes an empty media playlist.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(UdpHlsError::AlreadyStarted(self.config.name.clone()));
        }

        if let Some(dir) = &self.config.directory {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                self.started.store(false, Ordering::Release);
                return Err(e.into());
            }
        }

        let writer = self.writer.lock().await;
        self.publish(&writer.playlist, None, &[]).await?;
        info!(
            "packager {} started ({})",
            self.config.name,
            match &self.config.directory {
                Some(dir) => dir.display().to_string(),
                None => "in memory".to_string(),
            }
        );
        Ok(())
    }

    /// Switches the variant to video-only before any media has been written.
    pub async fn disable_audio(&self) {
        let mut writer = self.writer.lock().await;
        if writer.audio_enabled && writer.current.is_none() {
            writer.audio_enabled = false;
            writer.muxer = TSMuxer::new(false);
        }
    }

    /// Writes one H.264 access unit with normalized timestamps.
    pub async fn write_h264(
        &self,
        arrival: DateTime<Utc>,
        pts: i64,
        dts: i64,
        nalus: Vec<Bytes>,
    ) -> Result<()> {
        if !self.is_started() {
            return Err(UdpHlsError::NotStarted(self.config.name.clone()));
        }
        let mut guard = self.writer.lock().await;
        let writer = &mut *guard;
        if writer.closed {
            return Ok(());
        }

        let mut idr = false;
        let mut has_aud = false;
        let mut has_parameter_sets = false;
        for unit in &nalus {
            match writer.h264.parse_nalu(unit) {
                Ok(Some(nalu)) => match nalu.nal_type {
                    NALUnitType::CodedSliceIDR => idr = true,
                    NALUnitType::AccessUnitDelimiter => has_aud = true,
                    NALUnitType::SPS | NALUnitType::PPS => has_parameter_sets = true,
                    _ => {}
                },
                Ok(None) => {}
                Err(e) => warn!("{}: unparsable NAL unit: {}", self.config.name, e),
            }
        }

        if writer.current.is_none() && !idr {
            trace!("{}: dropping access unit before first IDR", self.config.name);
            return Ok(());
        }

        let mut units = Vec::with_capacity(nalus.len() + 3);
        if !has_aud {
            units.push(Bytes::from_static(&ACCESS_UNIT_DELIMITER));
        }
        if idr && !has_parameter_sets {
            if let (Some(sps), Some(pps)) = (writer.h264.sps(), writer.h264.pps()) {
                units.push(sps.clone());
                units.push(pps.clone());
            }
        }
        units.extend(nalus);

        let cut = match &writer.current {
            None => true,
            Some(seg) => {
                idr && dts - seg.start_dts >= duration_to_ticks(self.config.segment_duration)
            }
        };
        if cut {
            if writer.next_sequence == 0 {
                if let Some(coded) = writer.h264.dimensions() {
                    if resolution_mismatch(coded, &self.config.resolution) {
                        warn!(
                            "{}: stream is {}x{} but the variant is announced as {}",
                            self.config.name, coded.0, coded.1, self.config.resolution
                        );
                    }
                }
            }
            self.finish_segment(writer, dts).await?;
            writer.current = Some(OpenSegment {
                sequence: writer.next_sequence,
                start_dts: dts,
                last_dts: dts,
                last_delta: 0,
                arrival,
                buf: BytesMut::with_capacity(64 * 1024),
            });
            writer.next_sequence += 1;
        }

        let muxer = &mut writer.muxer;
        if let Some(seg) = writer.current.as_mut() {
            if seg.buf.is_empty() {
                muxer.write_tables(&mut seg.buf);
            }
            muxer.write_video(
                &mut seg.buf,
                output_ts(pts),
                output_ts(dts),
                join_annexb(&units),
                idr,
            );
            if dts > seg.last_dts {
                seg.last_delta = dts - seg.last_dts;
                seg.last_dts = dts;
            }
        }
        Ok(())
    }

    /// Writes the raw AAC frames of one PES packet.
    pub async fn write_aac(
        &self,
        _arrival: DateTime<Utc>,
        pts: i64,
        config: &AACConfig,
        frames: &[Bytes],
    ) -> Result<()> {
        if !self.is_started() {
            return Err(UdpHlsError::NotStarted(self.config.name.clone()));
        }
        let mut guard = self.writer.lock().await;
        let writer = &mut *guard;
        if writer.closed || !writer.audio_enabled {
            return Ok(());
        }

        let muxer = &mut writer.muxer;
        let Some(seg) = writer.current.as_mut() else {
            trace!("{}: dropping audio before first IDR", self.config.name);
            return Ok(());
        };

        let mut payload = Vec::new();
        for frame in frames {
            payload.extend_from_slice(&config.adts_header(frame.len()).to_bytes());
            payload.extend_from_slice(frame);
        }
        if payload.is_empty() {
            return Ok(());
        }
        muxer.write_audio(&mut seg.buf, output_ts(pts), payload);
        Ok(())
    }

    /// Flushes the open segment and marks the playlist as ended.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = &mut *guard;
        if writer.closed || !self.is_started() {
            return Ok(());
        }
        writer.closed = true;

        writer.playlist.is_endlist = true;
        match writer.current.as_ref() {
            Some(seg) => {
                let end = seg.last_dts + seg.last_delta.max(1);
                self.finish_segment(writer, end).await?;
            }
            None => self.publish(&writer.playlist, None, &[]).await?,
        }
        debug!("packager {} closed", self.config.name);
        Ok(())
    }

    /// Stores the open segment (if any) and republishes the playlist.
    async fn finish_segment(&self, writer: &mut WriterState, end_dts: i64) -> Result<()> {
        let Some(seg) = writer.current.take() else {
            return Ok(());
        };

        let name = self.config.segment_name(seg.sequence);
        let data = seg.buf.freeze();
        let size = data.len();
        let duration = ticks_to_duration(end_dts - seg.start_dts).unwrap_or(Duration::ZERO);

        let stored = match &self.config.directory {
            Some(dir) => {
                let path = dir.join(&name);
                tokio::fs::write(&path, &data).await?;
                SegmentData::File { path, size }
            }
            None => SegmentData::Memory(data),
        };

        debug!(
            "{}: segment {} ({:.3}s, {} bytes)",
            self.config.name,
            name,
            duration.as_secs_f64(),
            size
        );

        let evicted = writer.playlist.push(
            HLSSegment {
                filename: name.clone(),
                duration,
                sequence_number: seg.sequence,
                program_date_time: seg.arrival,
                size,
            },
            self.config.segment_count,
        );
        self.publish(&writer.playlist, Some((name, stored)), &evicted)
            .await
    }

    /// Swaps the served index, then mirrors the change on disk.
    async fn publish(
        &self,
        playlist: &HLSPlaylist,
        added: Option<(String, SegmentData)>,
        evicted: &[HLSSegment],
    ) -> Result<()> {
        let text = Bytes::from(playlist.to_bytes().await?);
        {
            let mut index = self.index.write();
            index.playlist = text.clone();
            if let Some((name, data)) = added {
                index.segments.insert(name, data);
            }
            for old in evicted {
                index.segments.remove(&old.filename);
            }
        }

        if let Some(dir) = &self.config.directory {
            for old in evicted {
                if let Err(e) = tokio::fs::remove_file(dir.join(&old.filename)).await {
                    warn!("{}: failed to delete {}: {}", self.config.name, old.filename, e);
                }
            }
            tokio::fs::write(dir.join(self.config.playlist_name()), &text).await?;
        }
        Ok(())
    }

    /// Current media playlist text.
    pub fn playlist(&self) -> Bytes {
        self.index.read().playlist.clone()
    }

    /// Names of the segments currently listed.
    pub fn segment_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.index.read().segments.keys().cloned().collect();
        names.sort();
        names
    }
}

/// True when a well-formed `WxH` differs from the coded picture size.
fn resolution_mismatch(coded: (u32, u32), announced: &str) -> bool {
    match split_resolution(announced) {
        Some((width, height)) => {
            width.parse::<u32>().ok() != Some(coded.0)
                || height.parse::<u32>().ok() != Some(coded.1)
        }
        None => false,
    }
}

fn output_ts(ts: i64) -> u64 {
    (ts + TIMESTAMP_OFFSET).max(0) as u64
}

#[cfg(test)]
#[path = "packager_test.rs"]
mod packager_test;
