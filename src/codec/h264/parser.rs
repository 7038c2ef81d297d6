use bytes::Bytes;
use log::debug;

use super::types::{NALUnit, NALUnitType, SPSInfo};
use crate::utils::BitReader;
use crate::Result;

/// Access unit delimiter carrying `primary_pic_type = 7` (any slice type).
pub const ACCESS_UNIT_DELIMITER: [u8; 2] = [0x09, 0xF0];

/// Splits an Annex-B byte stream into NAL units.
///
/// Both three- and four-byte start codes are accepted. The returned units share
/// the input buffer and carry no start code; empty units are dropped.
pub fn split_annexb(data: &Bytes) -> Vec<Bytes> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            if let Some(begin) = start {
                let mut end = i;
                // The zero of a four-byte start code belongs to the next unit.
                while end > begin && data[end - 1] == 0x00 {
                    end -= 1;
                }
                if end > begin {
                    units.push(data.slice(begin..end));
                }
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    if let Some(begin) = start {
        if begin < data.len() {
            units.push(data.slice(begin..));
        }
    }

    units
}

/// Joins NAL units into an Annex-B byte stream using four-byte start codes.
pub fn join_annexb(units: &[Bytes]) -> Vec<u8> {
    let size = units.iter().map(|u| u.len() + 4).sum();
    let mut out = Vec::with_capacity(size);
    for unit in units {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(unit);
    }
    out
}

/// Strips `emulation_prevention_three_byte`s from a NAL payload.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Tracks the parameter sets of an H.264 elementary stream.
#[derive(Debug, Default)]
pub struct H264Parser {
    sps_info: Option<SPSInfo>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl H264Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies a NAL unit and remembers SPS/PPS units as they pass by.
    pub fn parse_nalu(&mut self, data: &Bytes) -> Result<Option<NALUnit>> {
        let nalu = match NALUnit::new(data.clone()) {
            Some(nalu) => nalu,
            None => return Ok(None),
        };

        match nalu.nal_type {
            NALUnitType::SPS => {
                if self.sps.as_ref() != Some(data) {
                    let info = parse_sps(&remove_emulation_prevention(&data[1..]))?;
                    debug!(
                        "h264 sps: {} {}x{}",
                        info.codec_string(),
                        info.width,
                        info.height
                    );
                    self.sps_info = Some(info);
                    self.sps = Some(data.clone());
                }
            }
            NALUnitType::PPS => self.pps = Some(data.clone()),
            _ => {}
        }

        Ok(Some(nalu))
    }

    pub fn sps(&self) -> Option<&Bytes> {
        self.sps.as_ref()
    }

    pub fn pps(&self) -> Option<&Bytes> {
        self.pps.as_ref()
    }

    /// Coded picture size from the most recent SPS.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.sps_info.as_ref().map(|sps| (sps.width, sps.height))
    }
}

/// Parses the fields of an SPS RBSP (NAL header excluded) up to the frame cropping.
pub fn parse_sps(rbsp: &[u8]) -> Result<SPSInfo> {
    let mut reader = BitReader::new(rbsp);

    let profile_idc = reader.read_bits(8)? as u8;
    let constraint_flags = reader.read_bits(8)? as u8;
    let level_idc = reader.read_bits(8)? as u8;
    reader.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            reader.skip_bits(1)?; // separate_colour_plane_flag
        }
        reader.read_ue()?; // bit_depth_luma_minus8
        reader.read_ue()?; // bit_depth_chroma_minus8
        reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_bit()? {
            let lists = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..lists {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_ue()?; // log2_max_frame_num_minus4
    match reader.read_ue()? {
        0 => {
            reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            reader.skip_bits(1)?; // delta_pic_order_always_zero_flag
            reader.read_se()?; // offset_for_non_ref_pic
            reader.read_se()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_ue()?;
            for _ in 0..cycle {
                reader.read_se()?;
            }
        }
        _ => {}
    }

    reader.read_ue()?; // max_num_ref_frames
    reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_in_mbs = reader.read_ue()? + 1;
    let height_in_map_units = reader.read_ue()? + 1;
    let frame_mbs_only = reader.read_bit()? as u32;
    if frame_mbs_only == 0 {
        reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.skip_bits(1)?; // direct_8x8_inference_flag

    let mut width = width_in_mbs * 16;
    let mut height = (2 - frame_mbs_only) * height_in_map_units * 16;

    if reader.read_bit()? {
        let left = reader.read_ue()?;
        let right = reader.read_ue()?;
        let top = reader.read_ue()?;
        let bottom = reader.read_ue()?;
        let (crop_x, crop_y) = match chroma_format_idc {
            0 => (1, 2 - frame_mbs_only),
            1 => (2, 2 * (2 - frame_mbs_only)),
            2 => (2, 2 - frame_mbs_only),
            _ => (1, 2 - frame_mbs_only),
        };
        width = width.saturating_sub((left + right) * crop_x);
        height = height.saturating_sub((top + bottom) * crop_y);
    }

    Ok(SPSInfo {
        profile_idc,
        constraint_flags,
        level_idc,
        width,
        height,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
