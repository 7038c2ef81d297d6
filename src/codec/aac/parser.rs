use bytes::Bytes;

use super::types::{AACConfig, ADTSHeader, ProfileType, ADTS_HEADER_SIZE};
use crate::utils::BitReader;
use crate::{Result, UdpHlsError};

/// Raw AAC frames pulled out of one ADTS byte run.
#[derive(Debug, Clone)]
pub struct ADTSFrames {
    pub config: AACConfig,
    pub frames: Vec<Bytes>,
}

#[derive(Debug, Default)]
pub struct AACParser {
    config: Option<AACConfig>,
}

impl AACParser {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn parse_adts_header(&self, data: &[u8]) -> Result<ADTSHeader> {
        if data.len() < ADTS_HEADER_SIZE {
            return Err(UdpHlsError::Parser("ADTS header too short".into()));
        }

        let mut reader = BitReader::new(data);
        if reader.read_bits(12)? != 0xFFF {
            return Err(UdpHlsError::Parser("invalid ADTS sync word".into()));
        }

        let id = reader.read_bits(1)? as u8;
        reader.skip_bits(2)?; // layer
        let protection_absent = reader.read_bit()?;
        let profile = ProfileType::from(reader.read_bits(2)? as u8);
        let sample_rate_index = reader.read_bits(4)? as u8;
        reader.skip_bits(1)?; // private_bit
        let channel_configuration = reader.read_bits(3)? as u8;
        reader.skip_bits(4)?; // original_copy, home, copyright id bit and start
        let frame_length = reader.read_bits(13)? as u16;
        let buffer_fullness = reader.read_bits(11)? as u16;
        let number_of_raw_blocks = reader.read_bits(2)? as u8;

        let config = AACConfig {
            profile,
            sample_rate_index,
            channel_configuration,
        };
        if config.sample_rate().is_none() {
            return Err(UdpHlsError::Parser(format!(
                "reserved ADTS sample rate index {}",
                sample_rate_index
            )));
        }

        Ok(ADTSHeader {
            id,
            protection_absent,
            profile,
            sample_rate_index,
            channel_configuration,
            frame_length,
            buffer_fullness,
            number_of_raw_blocks,
        })
    }

    /// Splits a PES payload made of consecutive ADTS frames into raw AAC frames.
    ///
    /// Every frame must be complete; a truncated or unsynchronized run is an error.
    pub fn split_frames(&mut self, data: &Bytes) -> Result<ADTSFrames> {
        let mut frames = Vec::new();
        let mut config = None;
        let mut pos = 0;

        while pos < data.len() {
            let header = self.parse_adts_header(&data[pos..])?;
            let frame_length = header.frame_length as usize;
            let header_len = header.header_len();
            if frame_length < header_len || pos + frame_length > data.len() {
                return Err(UdpHlsError::Parser(format!(
                    "ADTS frame length {} exceeds payload",
                    frame_length
                )));
            }
            frames.push(data.slice(pos + header_len..pos + frame_length));
            config.get_or_insert_with(|| header.config());
            pos += frame_length;
        }

        let config = config.ok_or_else(|| UdpHlsError::Parser("empty ADTS payload".into()))?;
        self.config = Some(config.clone());
        Ok(ADTSFrames { config, frames })
    }

    /// Configuration of the most recent ADTS run.
    pub fn config(&self) -> Option<&AACConfig> {
        self.config.as_ref()
    }
}
