use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct NALUnit {
    pub nal_type: NALUnitType,
    pub nal_ref_idc: u8,
    pub data: Bytes,
}

impl NALUnit {
    /// Wraps a NAL unit (header byte included, no start code).
    pub fn new(data: Bytes) -> Option<Self> {
        let header = *data.first()?;
        Some(Self {
            nal_type: NALUnitType::from(header & 0x1F),
            nal_ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    pub fn is_idr(&self) -> bool {
        self.nal_type == NALUnitType::CodedSliceIDR
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SPSInfo {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub width: u32,
    pub height: u32,
}

impl SPSInfo {
    /// RFC 6381 codec string, e.g. `avc1.42c01f`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_idc, self.constraint_flags, self.level_idc
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    Unspecified,
    CodedSliceNonIDR,
    CodedSliceDataPartitionA,
    CodedSliceDataPartitionB,
    CodedSliceDataPartitionC,
    CodedSliceIDR,
    SEI,
    SPS,
    PPS,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    Other(u8),
}

impl From<u8> for NALUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => NALUnitType::Unspecified,
            1 => NALUnitType::CodedSliceNonIDR,
            2 => NALUnitType::CodedSliceDataPartitionA,
            3 => NALUnitType::CodedSliceDataPartitionB,
            4 => NALUnitType::CodedSliceDataPartitionC,
            5 => NALUnitType::CodedSliceIDR,
            6 => NALUnitType::SEI,
            7 => NALUnitType::SPS,
            8 => NALUnitType::PPS,
            9 => NALUnitType::AccessUnitDelimiter,
            10 => NALUnitType::EndOfSequence,
            11 => NALUnitType::EndOfStream,
            12 => NALUnitType::FillerData,
            other => NALUnitType::Other(other),
        }
    }
}
