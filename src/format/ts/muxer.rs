use super::pes::PESPacket;
use super::types::*;
use crate::utils::Crc32Mpeg2;
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

/// Writes a single-program transport stream into memory.
///
/// The packager feeds it one segment at a time: `write_tables` at the start
/// of every segment, then PES-packetized access units. Continuity counters
/// carry over from one segment to the next.
#[derive(Debug)]
pub struct TSMuxer {
    pat: PAT,
    pmt: PMT,
    continuity_counters: HashMap<u16, u8>,
}

impl TSMuxer {
    pub fn new(with_audio: bool) -> Self {
        let mut pat = PAT::new();
        pat.entries.push(PATEntry {
            program_number: 1,
            program_map_pid: PID_PMT,
        });

        let mut pmt = PMT::new();
        pmt.pcr_pid = PID_VIDEO;
        pmt.elementary_stream_infos.push(ElementaryStreamInfo {
            stream_type: STREAM_TYPE_H264,
            elementary_pid: PID_VIDEO,
            descriptors: Vec::new(),
        });
        if with_audio {
            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type: STREAM_TYPE_AAC,
                elementary_pid: PID_AUDIO,
                descriptors: Vec::new(),
            });
        }

        Self {
            pat,
            pmt,
            continuity_counters: HashMap::new(),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.pmt
            .elementary_stream_infos
            .iter()
            .any(|info| info.elementary_pid == PID_AUDIO)
    }

    /// Emits one PAT packet followed by one PMT packet.
    pub fn write_tables(&mut self, out: &mut BytesMut) {
        let mut body = BytesMut::new();
        self.pat.write_to(&mut body);
        let section = build_section(TABLE_ID_PAT, TABLE_EXT_PAT, &body);
        self.write_section_packet(out, PID_PAT, &section);

        let mut body = BytesMut::new();
        self.pmt.write_to(&mut body);
        let section = build_section(TABLE_ID_PMT, TABLE_EXT_PMT, &body);
        self.write_section_packet(out, PID_PMT, &section);
    }

    /// Packetizes one video access unit, carrying a PCR derived from its DTS.
    pub fn write_video(
        &mut self,
        out: &mut BytesMut,
        pts: u64,
        dts: u64,
        payload: Vec<u8>,
        random_access: bool,
    ) {
        let mut pes = PESPacket::new(STREAM_ID_VIDEO, payload).with_pts(pts);
        if dts != pts {
            pes = pes.with_dts(dts);
        }
        let pcr = dts.saturating_sub(PCR_LEAD);
        self.write_pes(out, PID_VIDEO, &pes.to_bytes(), Some(pcr), random_access);
    }

    pub fn write_audio(&mut self, out: &mut BytesMut, pts: u64, payload: Vec<u8>) {
        let pes = PESPacket::new(STREAM_ID_AUDIO, payload).with_pts(pts);
        self.write_pes(out, PID_AUDIO, &pes.to_bytes(), None, false);
    }

    fn write_pes(
        &mut self,
        out: &mut BytesMut,
        pid: u16,
        pes: &[u8],
        pcr: Option<u64>,
        random_access: bool,
    ) {
        let mut rest = pes;
        let mut first = true;
        while !rest.is_empty() {
            let (pcr, random_access) = if first {
                (pcr, random_access)
            } else {
                (None, false)
            };
            let taken = self.write_packet(out, pid, first, pcr, random_access, rest);
            rest = &rest[taken..];
            first = false;
        }
    }

    fn write_section_packet(&mut self, out: &mut BytesMut, pid: u16, section: &[u8]) {
        let mut payload = Vec::with_capacity(section.len() + 1);
        payload.push(0); // pointer field
        payload.extend_from_slice(section);

        let header = TSHeader {
            payload_unit_start: true,
            pid,
            continuity_counter: self.next_continuity_counter(pid),
            ..Default::default()
        };
        let start = out.len();
        header.write_to(out);
        out.put_slice(&payload[..payload.len().min(TS_PAYLOAD_SIZE)]);
        out.resize(start + TS_PACKET_SIZE, 0xFF);
    }

    /// Writes one TS packet and returns how many payload bytes it consumed.
    fn write_packet(
        &mut self,
        out: &mut BytesMut,
        pid: u16,
        payload_unit_start: bool,
        pcr: Option<u64>,
        random_access: bool,
        data: &[u8],
    ) -> usize {
        let needs_flags = pcr.is_some() || random_access;
        let pcr_len = if pcr.is_some() { 6 } else { 0 };
        let mut adaptation_len = if needs_flags { 2 + pcr_len } else { 0 };

        let capacity = TS_PAYLOAD_SIZE - adaptation_len;
        let taken = capacity.min(data.len());
        // short payloads are padded through the adaptation field
        adaptation_len += capacity - taken;

        let header = TSHeader {
            payload_unit_start,
            pid,
            adaptation_field_exists: adaptation_len > 0,
            continuity_counter: self.next_continuity_counter(pid),
            ..Default::default()
        };
        header.write_to(out);

        if adaptation_len > 0 {
            out.put_u8((adaptation_len - 1) as u8);
            if adaptation_len > 1 {
                let mut flags = 0u8;
                if random_access {
                    flags |= 0x40;
                }
                if pcr.is_some() {
                    flags |= 0x10;
                }
                out.put_u8(flags);
                if let Some(pcr) = pcr {
                    write_pcr(out, pcr);
                }
                for _ in 0..adaptation_len - 2 - pcr_len {
                    out.put_u8(0xFF);
                }
            }
        }

        out.put_slice(&data[..taken]);
        taken
    }

    fn next_continuity_counter(&mut self, pid: u16) -> u8 {
        let counter = self.continuity_counters.entry(pid).or_insert(0);
        let current = *counter;
        *counter = (*counter + 1) & 0x0F;
        current
    }
}

/// PCR trails the first DTS of the access unit by 100 ms.
const PCR_LEAD: u64 = 9_000;

fn write_pcr(out: &mut BytesMut, base: u64) {
    let base = base & 0x1_FFFF_FFFF;
    out.put_u32((base >> 1) as u32);
    out.put_u8((((base & 1) << 7) as u8) | 0x7E);
    out.put_u8(0x00);
}

/// Builds a long-form PSI section with its trailing CRC.
pub(crate) fn build_section(table_id: u8, table_id_extension: u16, body: &[u8]) -> BytesMut {
    let section_length = 5 + body.len() + 4;
    let mut section = BytesMut::with_capacity(3 + section_length);
    section.put_u8(table_id);
    section.put_u16(0xB000 | (section_length as u16 & 0x03FF));
    section.put_u16(table_id_extension);
    section.put_u8(0xC1); // version 0, current
    section.put_u8(0);
    section.put_u8(0);
    section.put_slice(body);
    let crc = Crc32Mpeg2::checksum(&section);
    section.put_u32(crc);
    section
}
