use bytes::{BufMut, Bytes, BytesMut};

/// ADTS header size without CRC.
pub const ADTS_HEADER_SIZE: usize = 7;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// ADTS `profile` field, i.e. the MPEG-4 audio object type minus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    Main = 0,
    LC = 1,
    SSR = 2,
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            _ => ProfileType::LTP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AACConfig {
    pub profile: ProfileType,
    pub sample_rate_index: u8,
    pub channel_configuration: u8,
}

impl Default for AACConfig {
    /// AAC-LC, 44.1 kHz, stereo.
    fn default() -> Self {
        Self {
            profile: ProfileType::LC,
            sample_rate_index: 4,
            channel_configuration: 2,
        }
    }
}

impl AACConfig {
    /// Sampling frequency in Hz, `None` for reserved indices.
    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLE_RATES.get(self.sample_rate_index as usize).copied()
    }

    /// Builds the ADTS header for a raw frame of `payload_len` bytes.
    pub fn adts_header(&self, payload_len: usize) -> ADTSHeader {
        ADTSHeader {
            id: 0,
            protection_absent: true,
            profile: self.profile,
            sample_rate_index: self.sample_rate_index,
            channel_configuration: self.channel_configuration,
            frame_length: (payload_len + ADTS_HEADER_SIZE) as u16,
            buffer_fullness: 0x7FF,
            number_of_raw_blocks: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ADTSHeader {
    pub id: u8,                    // 1 bit, 0=MPEG-4, 1=MPEG-2
    pub protection_absent: bool,   // 1 bit
    pub profile: ProfileType,      // 2 bits
    pub sample_rate_index: u8,     // 4 bits
    pub channel_configuration: u8, // 3 bits
    pub frame_length: u16,         // 13 bits, header included
    pub buffer_fullness: u16,      // 11 bits
    pub number_of_raw_blocks: u8,  // 2 bits
}

impl ADTSHeader {
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE + 2
        }
    }

    pub fn config(&self) -> AACConfig {
        AACConfig {
            profile: self.profile,
            sample_rate_index: self.sample_rate_index,
            channel_configuration: self.channel_configuration,
        }
    }

    /// Serializes a CRC-less header.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ADTS_HEADER_SIZE);
        let length = self.frame_length as u32 & 0x1FFF;
        let fullness = self.buffer_fullness as u32 & 0x7FF;

        buf.put_u8(0xFF);
        buf.put_u8(0xF0 | (self.id & 0x01) << 3 | 0x01);
        buf.put_u8(
            (self.profile as u8) << 6
                | (self.sample_rate_index & 0x0F) << 2
                | (self.channel_configuration >> 2) & 0x01,
        );
        buf.put_u8((self.channel_configuration & 0x03) << 6 | (length >> 11) as u8);
        buf.put_u8((length >> 3) as u8);
        buf.put_u8(((length & 0x07) << 5) as u8 | (fullness >> 6) as u8);
        buf.put_u8(((fullness & 0x3F) << 2) as u8 | self.number_of_raw_blocks & 0x03);
        buf.freeze()
    }
}
