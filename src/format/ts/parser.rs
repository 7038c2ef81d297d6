use super::types::*;
use crate::error::{Result, UdpHlsError};
use crate::utils::Crc32Mpeg2;

/// Long-form PSI section with its CRC already verified.
#[derive(Debug)]
pub struct PSISection<'a> {
    pub table_id: u8,
    pub table_id_extension: u16,
    pub version: u8,
    /// Section payload between the 8-byte header and the CRC.
    pub body: &'a [u8],
}

/// Stateless parsing of TS packet headers, adaptation fields and PSI tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct TSPacketParser;

impl TSPacketParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(UdpHlsError::InvalidData("TS packet too short".into()));
        }

        if data[0] != TS_SYNC_BYTE {
            return Err(UdpHlsError::InvalidData("invalid sync byte".into()));
        }

        Ok(TSHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field that starts right after the 4-byte header.
    pub fn parse_adaptation_field(&self, packet: &[u8]) -> Result<AdaptationField> {
        let offset = TS_HEADER_SIZE;
        let length = *packet
            .get(offset)
            .ok_or_else(|| UdpHlsError::InvalidData("adaptation field missing".into()))?
            as usize;
        if offset + 1 + length > packet.len() {
            return Err(UdpHlsError::InvalidData("adaptation field too long".into()));
        }

        let mut field = AdaptationField {
            length,
            ..Default::default()
        };
        if length == 0 {
            return Ok(field);
        }

        let flags = packet[offset + 1];
        field.discontinuity = flags & 0x80 != 0;
        field.random_access = flags & 0x40 != 0;

        if flags & 0x10 != 0 {
            if length < 7 {
                return Err(UdpHlsError::InvalidData("PCR data too short".into()));
            }
            let p = &packet[offset + 2..offset + 8];
            let base = ((p[0] as u64) << 25)
                | ((p[1] as u64) << 17)
                | ((p[2] as u64) << 9)
                | ((p[3] as u64) << 1)
                | ((p[4] as u64) >> 7);
            let ext = (((p[4] & 0x01) as u64) << 8) | p[5] as u64;
            field.pcr = Some(base * 300 + ext);
        }

        Ok(field)
    }

    /// Validates a complete long-form section (table_id through CRC).
    pub fn parse_section<'a>(&self, section: &'a [u8]) -> Result<PSISection<'a>> {
        if section.len() < 12 {
            return Err(UdpHlsError::InvalidData("PSI section too short".into()));
        }
        let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        let total = 3 + section_length;
        if section_length < 9 || total > section.len() {
            return Err(UdpHlsError::InvalidData(format!(
                "PSI section length {} out of range",
                section_length
            )));
        }
        let section = &section[..total];
        if !Crc32Mpeg2::verify(section) {
            return Err(UdpHlsError::InvalidData("PSI section CRC mismatch".into()));
        }

        Ok(PSISection {
            table_id: section[0],
            table_id_extension: ((section[3] as u16) << 8) | section[4] as u16,
            version: (section[5] >> 1) & 0x1F,
            body: &section[8..total - 4],
        })
    }

    pub fn parse_pat(&self, body: &[u8]) -> Result<PAT> {
        if body.len() % 4 != 0 {
            return Err(UdpHlsError::InvalidData("PAT body misaligned".into()));
        }
        let entries = body
            .chunks_exact(4)
            .map(|e| PATEntry {
                program_number: ((e[0] as u16) << 8) | e[1] as u16,
                program_map_pid: (((e[2] & 0x1F) as u16) << 8) | e[3] as u16,
            })
            .collect();
        Ok(PAT { entries })
    }

    pub fn parse_pmt(&self, body: &[u8]) -> Result<PMT> {
        if body.len() < 4 {
            return Err(UdpHlsError::InvalidData("PMT too short".into()));
        }
        let mut pmt = PMT::new();
        pmt.pcr_pid = (((body[0] & 0x1F) as u16) << 8) | body[1] as u16;

        let program_info_length = (((body[2] & 0x0F) as usize) << 8) | body[3] as usize;
        let mut pos = 4;
        if pos + program_info_length > body.len() {
            return Err(UdpHlsError::InvalidData("program info too long".into()));
        }
        pmt.program_descriptors = self.parse_descriptors(&body[pos..pos + program_info_length])?;
        pos += program_info_length;

        while pos + 5 <= body.len() {
            let stream_type = body[pos];
            let elementary_pid = (((body[pos + 1] & 0x1F) as u16) << 8) | body[pos + 2] as u16;
            let es_info_length = (((body[pos + 3] & 0x0F) as usize) << 8) | body[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > body.len() {
                return Err(UdpHlsError::InvalidData("ES info too long".into()));
            }
            let descriptors = self.parse_descriptors(&body[pos..pos + es_info_length])?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(UdpHlsError::InvalidData("descriptor too long".into()));
            }
            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}
