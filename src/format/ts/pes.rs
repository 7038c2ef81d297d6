use crate::error::{Result, UdpHlsError};
use bytes::{BufMut, BytesMut};

const PTS_MASK: u64 = 0x1_FFFF_FFFF;
const PTS_DTS_FLAG_PTS: u8 = 0x80;
const PTS_DTS_FLAG_DTS: u8 = 0x40;

/// Packetized Elementary Stream (PES) header
///
/// Only the fields the HLS packager and the transport stream reader need are
/// modelled; ESCR, ES rate, trick mode and extensions are never emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// PES_packet_length, 0 meaning unbounded (video only)
    pub packet_length: u16,
    pub data_alignment: bool,
    /// Presentation Time Stamp (33 bits, 90 kHz)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits, 90 kHz)
    pub dts: Option<u64>,
}

impl PESHeader {
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & PTS_MASK);
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts & PTS_MASK);
        self
    }

    fn pts_dts_flags(&self) -> u8 {
        match (self.pts, self.dts) {
            (Some(_), Some(_)) => PTS_DTS_FLAG_PTS | PTS_DTS_FLAG_DTS,
            (Some(_), None) => PTS_DTS_FLAG_PTS,
            _ => 0,
        }
    }

    /// Bytes following the header_data_length field.
    pub fn header_data_length(&self) -> u8 {
        match self.pts_dts_flags() {
            0xC0 => 10,
            0x80 => 5,
            _ => 0,
        }
    }

    /// Total size of the encoded header.
    pub fn len(&self) -> usize {
        9 + self.header_data_length() as usize
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        // '10' marker, no scrambling, no priority
        let mut flags = 0x80u8;
        if self.data_alignment {
            flags |= 0x04;
        }
        buf.put_u8(flags);
        buf.put_u8(self.pts_dts_flags());
        buf.put_u8(self.header_data_length());

        match (self.pts, self.dts) {
            (Some(pts), Some(dts)) => {
                write_timestamp(buf, 0x30, pts);
                write_timestamp(buf, 0x10, dts);
            }
            (Some(pts), None) => write_timestamp(buf, 0x20, pts),
            _ => {}
        }
    }

    /// Parses a PES header, returning it with the offset of the payload.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 9 {
            return Err(UdpHlsError::InvalidData("PES header too short".into()));
        }
        if data[0..3] != [0x00, 0x00, 0x01] {
            return Err(UdpHlsError::InvalidData("missing PES start code".into()));
        }

        let mut header = PESHeader::new(data[3]);
        header.packet_length = u16::from_be_bytes([data[4], data[5]]);
        if data[6] & 0xC0 != 0x80 {
            return Err(UdpHlsError::InvalidData("bad PES header marker".into()));
        }
        header.data_alignment = data[6] & 0x04 != 0;

        let flags = data[7] & 0xC0;
        let header_data_length = data[8] as usize;
        let payload_offset = 9 + header_data_length;
        if payload_offset > data.len() {
            return Err(UdpHlsError::InvalidData("PES header data too long".into()));
        }

        if flags & PTS_DTS_FLAG_PTS != 0 {
            if header_data_length < 5 {
                return Err(UdpHlsError::InvalidData("PTS field truncated".into()));
            }
            header.pts = Some(read_timestamp(&data[9..14]));
        }
        if flags == PTS_DTS_FLAG_PTS | PTS_DTS_FLAG_DTS {
            if header_data_length < 10 {
                return Err(UdpHlsError::InvalidData("DTS field truncated".into()));
            }
            header.dts = Some(read_timestamp(&data[14..19]));
        }

        Ok((header, payload_offset))
    }
}

/// A complete PES packet ready to be split across TS packets.
#[derive(Debug)]
pub struct PESPacket {
    pub header: PESHeader,
    pub payload: Vec<u8>,
}

impl PESPacket {
    pub fn new(stream_id: u8, payload: Vec<u8>) -> Self {
        let mut header = PESHeader::new(stream_id);
        header.data_alignment = true;
        Self { header, payload }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.header = self.header.with_pts(pts);
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.header = self.header.with_dts(dts);
        self
    }

    /// Serializes header and payload, filling in PES_packet_length when it fits.
    pub fn to_bytes(&self) -> BytesMut {
        let mut header = self.header.clone();
        let length = header.len() - 6 + self.payload.len();
        header.packet_length = u16::try_from(length).unwrap_or(0);

        let mut buf = BytesMut::with_capacity(header.len() + self.payload.len());
        header.write_to(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & PTS_MASK;
    buf.put_u8(marker | ((ts >> 29) & 0x0E) as u8 | 0x01);
    buf.put_u16((((ts >> 14) & 0xFFFE) | 0x01) as u16);
    buf.put_u16((((ts << 1) & 0xFFFE) | 0x01) as u16);
}

fn read_timestamp(data: &[u8]) -> u64 {
    (((data[0] >> 1) & 0x07) as u64) << 30
        | (data[1] as u64) << 22
        | ((data[2] >> 1) as u64) << 15
        | (data[3] as u64) << 7
        | (data[4] >> 1) as u64
}
