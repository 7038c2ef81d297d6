use super::parser::TSPacketParser;
use super::pes::PESHeader;
use super::types::*;
use crate::av::{AudioAccessUnits, CodecType, Track, VideoAccessUnit};
use crate::codec::aac::AACParser;
use crate::codec::h264::split_annexb;
use crate::error::{Result, UdpHlsError};
use crate::format::AccessUnitSink;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound for a PES packet being assembled without a declared length.
const MAX_PES_SIZE: usize = 8 * 1024 * 1024;

/// A PES packet being reassembled from TS payloads.
#[derive(Debug)]
struct PESBuilder {
    header: PESHeader,
    expected: Option<usize>,
    data: Vec<u8>,
}

impl PESBuilder {
    fn start(payload: &[u8]) -> Result<Self> {
        let (header, offset) = PESHeader::parse(payload)?;
        let expected = match header.packet_length {
            0 => None,
            len => Some((len as usize + 6).saturating_sub(offset)),
        };
        Ok(Self {
            header,
            expected,
            data: payload[offset..].to_vec(),
        })
    }

    fn push_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    fn is_complete(&self) -> bool {
        matches!(self.expected, Some(size) if self.data.len() >= size)
    }

    fn finish(mut self) -> (PESHeader, Bytes) {
        if let Some(size) = self.expected {
            self.data.truncate(size);
        }
        (self.header, Bytes::from(self.data))
    }
}

#[derive(Debug)]
struct StreamState {
    track: Track,
    last_counter: Option<u8>,
    pes: Option<PESBuilder>,
}

/// Demultiplexes an MPEG-TS byte stream into access units.
///
/// `new` consumes packets until the first program's PMT has been parsed, even
/// when it announces no stream this reader understands.
/// Afterwards `subscribe` selects the tracks to deliver and every call to
/// `read` consumes one TS packet, handing completed access units to the sink.
pub struct TSReader<R: AsyncRead + Unpin + Send> {
    reader: R,
    parser: TSPacketParser,
    packet: [u8; TS_PACKET_SIZE],
    pmt_pid: Option<u16>,
    pmt_seen: bool,
    tracks: Vec<Track>,
    sections: HashMap<u16, Vec<u8>>,
    streams: HashMap<u16, StreamState>,
    aac_parser: AACParser,
}

impl<R: AsyncRead + Unpin + Send> TSReader<R> {
    pub async fn new(reader: R) -> Result<Self> {
        let mut ts = Self {
            reader,
            parser: TSPacketParser::new(),
            packet: [0u8; TS_PACKET_SIZE],
            pmt_pid: None,
            pmt_seen: false,
            tracks: Vec::new(),
            sections: HashMap::new(),
            streams: HashMap::new(),
            aac_parser: AACParser::new(),
        };

        while !ts.pmt_seen {
            ts.next_packet().await?;
            ts.process_packet()?;
        }
        debug!("discovered {} tracks: {:?}", ts.tracks.len(), ts.tracks);
        Ok(ts)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Starts delivering access units of `track` to the sink.
    pub fn subscribe(&mut self, track: &Track) {
        self.streams.insert(
            track.pid,
            StreamState {
                track: track.clone(),
                last_counter: None,
                pes: None,
            },
        );
    }

    /// Reads one TS packet and delivers any access unit it completes.
    pub async fn read<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: AccessUnitSink + ?Sized,
    {
        self.next_packet().await?;
        for (track, header, payload) in self.process_packet()? {
            self.deliver(sink, &track, header, payload).await?;
        }
        Ok(())
    }

    async fn next_packet(&mut self) -> Result<()> {
        read_full(&mut self.reader, &mut self.packet).await?;

        while self.packet[0] != TS_SYNC_BYTE {
            let skip = self.packet[1..]
                .iter()
                .position(|&b| b == TS_SYNC_BYTE)
                .map(|p| p + 1)
                .unwrap_or(TS_PACKET_SIZE);
            warn!("lost TS sync, skipping {} bytes", skip);
            self.packet.copy_within(skip.., 0);
            read_full(&mut self.reader, &mut self.packet[TS_PACKET_SIZE - skip..]).await?;
        }
        Ok(())
    }

    /// Handles the buffered packet, returning any PES packets it completed.
    fn process_packet(&mut self) -> Result<Vec<(Track, PESHeader, Bytes)>> {
        let mut completed = Vec::new();

        let header = self.parser.parse_header(&self.packet)?;
        if header.transport_error {
            debug!("skipping packet with transport error on PID {}", header.pid);
            return Ok(completed);
        }

        let mut payload_offset = TS_HEADER_SIZE;
        if header.adaptation_field_exists {
            match self.parser.parse_adaptation_field(&self.packet) {
                Ok(field) => payload_offset += field.length + 1,
                Err(e) => {
                    warn!("skipping packet on PID {}: {}", header.pid, e);
                    return Ok(completed);
                }
            }
        }
        if !header.contains_payload || payload_offset >= TS_PACKET_SIZE {
            return Ok(completed);
        }

        let packet = self.packet;
        let payload = &packet[payload_offset..];

        if header.pid == PID_PAT || Some(header.pid) == self.pmt_pid {
            if let Some(section) = self.collect_section(header.pid, header.payload_unit_start, payload)
            {
                self.handle_section(header.pid, &section);
            }
            return Ok(completed);
        }

        let Some(stream) = self.streams.get_mut(&header.pid) else {
            return Ok(completed);
        };

        if let Some(last) = stream.last_counter {
            let expected = (last + 1) & 0x0F;
            if header.continuity_counter == last {
                trace!("duplicate packet on PID {}", header.pid);
                return Ok(completed);
            }
            if header.continuity_counter != expected && stream.pes.take().is_some() {
                warn!(
                    "continuity error on PID {} (expected {}, got {}), dropping PES",
                    header.pid, expected, header.continuity_counter
                );
            }
        }
        stream.last_counter = Some(header.continuity_counter);

        if header.payload_unit_start {
            if let Some(pes) = stream.pes.take() {
                let (pes_header, data) = pes.finish();
                completed.push((stream.track.clone(), pes_header, data));
            }
            match PESBuilder::start(payload) {
                Ok(pes) => stream.pes = Some(pes),
                Err(e) => warn!("malformed PES header on PID {}: {}", header.pid, e),
            }
        } else if let Some(pes) = stream.pes.as_mut() {
            pes.push_data(payload);
        }

        let (complete, oversized) = stream.pes.as_ref().map_or((false, false), |pes| {
            (pes.is_complete(), pes.data.len() > MAX_PES_SIZE)
        });
        if complete {
            if let Some(pes) = stream.pes.take() {
                let (pes_header, data) = pes.finish();
                completed.push((stream.track.clone(), pes_header, data));
            }
        } else if oversized {
            warn!("PES on PID {} exceeds {} bytes, dropping", header.pid, MAX_PES_SIZE);
            stream.pes = None;
        }

        Ok(completed)
    }

    /// Accumulates PSI payloads and returns a section once it is complete.
    fn collect_section(&mut self, pid: u16, unit_start: bool, payload: &[u8]) -> Option<Vec<u8>> {
        if unit_start {
            let start = 1 + payload[0] as usize;
            if start >= payload.len() {
                warn!("PSI pointer field out of range on PID {}", pid);
                self.sections.remove(&pid);
                return None;
            }
            self.sections.insert(pid, payload[start..].to_vec());
        } else if let Some(buf) = self.sections.get_mut(&pid) {
            buf.extend_from_slice(payload);
        } else {
            return None;
        }

        let buf = self.sections.get(&pid)?;
        if buf.len() < 3 {
            return None;
        }
        let total = 3 + ((((buf[1] & 0x0F) as usize) << 8) | buf[2] as usize);
        if buf.len() < total {
            return None;
        }
        self.sections.remove(&pid)
    }

    fn handle_section(&mut self, pid: u16, data: &[u8]) {
        let section = match self.parser.parse_section(data) {
            Ok(section) => section,
            Err(e) => {
                warn!("discarding PSI section on PID {}: {}", pid, e);
                return;
            }
        };

        match section.table_id {
            TABLE_ID_PAT if pid == PID_PAT => match self.parser.parse_pat(section.body) {
                Ok(pat) => {
                    if let Some(program) = pat.first_program() {
                        if self.pmt_pid != Some(program.program_map_pid) {
                            debug!("program map on PID {}", program.program_map_pid);
                        }
                        self.pmt_pid = Some(program.program_map_pid);
                    }
                }
                Err(e) => warn!("malformed PAT: {}", e),
            },
            TABLE_ID_PMT => match self.parser.parse_pmt(section.body) {
                Ok(pmt) => {
                    self.pmt_seen = true;
                    self.tracks = pmt
                        .elementary_stream_infos
                        .iter()
                        .filter_map(|info| {
                            let codec = match info.stream_type {
                                STREAM_TYPE_H264 => CodecType::H264,
                                STREAM_TYPE_H265 => CodecType::H265,
                                STREAM_TYPE_AAC => CodecType::AAC,
                                _ => return None,
                            };
                            Some(Track {
                                pid: info.elementary_pid,
                                stream_type: info.stream_type,
                                codec,
                            })
                        })
                        .collect();
                }
                Err(e) => warn!("malformed PMT: {}", e),
            },
            other => trace!("ignoring table {} on PID {}", other, pid),
        }
    }

    async fn deliver<S>(
        &mut self,
        sink: &mut S,
        track: &Track,
        header: PESHeader,
        data: Bytes,
    ) -> Result<()>
    where
        S: AccessUnitSink + ?Sized,
    {
        let Some(pts) = header.pts else {
            warn!("PES without PTS on PID {}, dropping", track.pid);
            return Ok(());
        };

        match track.codec {
            CodecType::H264 => {
                let nalus = split_annexb(&data);
                if nalus.is_empty() {
                    debug!("empty video PES on PID {}", track.pid);
                    return Ok(());
                }
                let mut unit = VideoAccessUnit::new(nalus).with_pts(pts as i64);
                if let Some(dts) = header.dts {
                    unit = unit.with_dts(dts as i64);
                }
                sink.on_video(track, unit).await
            }
            CodecType::AAC => match self.aac_parser.split_frames(&data) {
                Ok(adts) if !adts.frames.is_empty() => {
                    let unit =
                        AudioAccessUnits::new(adts.config, adts.frames).with_pts(pts as i64);
                    sink.on_audio(track, unit).await
                }
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!("malformed ADTS payload on PID {}: {}", track.pid, e);
                    Ok(())
                }
            },
            CodecType::H265 => Ok(()),
        }
    }
}

async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(UdpHlsError::EndOfStream),
        Err(e) => Err(e.into()),
    }
}
