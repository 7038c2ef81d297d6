pub mod aac;
pub mod h264;

pub use aac::{AACConfig, AACParser};
pub use h264::{H264Parser, NALUnit, NALUnitType};
