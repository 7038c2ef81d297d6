use super::parser::*;
use super::types::NALUnitType;
use bytes::Bytes;

// Baseline profile, level 3.0, 640x480, no VUI.
const SPS_640X480: [u8; 9] = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6, 0x40];

#[test]
fn test_split_annexb_mixed_start_codes() {
    let data = Bytes::from_static(&[
        0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, // AUD, four-byte start code
        0x00, 0x00, 0x01, 0x65, 0x88, 0x84, // IDR slice, three-byte start code
        0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, // non-IDR slice
    ]);
    let units = split_annexb(&data);
    assert_eq!(units.len(), 3);
    assert_eq!(&units[0][..], &[0x09, 0xF0]);
    assert_eq!(&units[1][..], &[0x65, 0x88, 0x84]);
    assert_eq!(&units[2][..], &[0x41, 0x9A]);
}

#[test]
fn test_split_annexb_without_start_code() {
    let data = Bytes::from_static(&[0x65, 0x88, 0x84]);
    assert!(split_annexb(&data).is_empty());
}

#[test]
fn test_join_then_split_keeps_units() {
    let units = vec![
        Bytes::from_static(&[0x67, 0x42]),
        Bytes::from_static(&[0x68, 0xCE]),
        Bytes::from_static(&[0x65, 0x00, 0x11]),
    ];
    let joined = Bytes::from(join_annexb(&units));
    assert_eq!(split_annexb(&joined), units);
}

#[test]
fn test_remove_emulation_prevention() {
    assert_eq!(
        remove_emulation_prevention(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02]),
        vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]
    );
    assert_eq!(
        remove_emulation_prevention(&[0x00, 0x01, 0x02, 0x03]),
        vec![0x00, 0x01, 0x02, 0x03]
    );
}

#[test]
fn test_parse_sps_dimensions() {
    let info = parse_sps(&SPS_640X480[1..]).unwrap();
    assert_eq!(info.profile_idc, 66);
    assert_eq!(info.level_idc, 30);
    assert_eq!((info.width, info.height), (640, 480));
    assert_eq!(info.codec_string(), "avc1.42c01e");
}

#[test]
fn test_parser_caches_parameter_sets() {
    let mut parser = H264Parser::new();
    assert_eq!(parser.dimensions(), None);

    let sps = Bytes::from_static(&SPS_640X480);
    let nalu = parser.parse_nalu(&sps).unwrap().unwrap();
    assert_eq!(nalu.nal_type, NALUnitType::SPS);
    assert_eq!(parser.dimensions(), Some((640, 480)));

    let pps = Bytes::from_static(&[0x68, 0xCE, 0x3C, 0x80]);
    parser.parse_nalu(&pps).unwrap();
    assert_eq!(parser.pps(), Some(&pps));

    let idr = Bytes::from_static(&[0x65, 0x88]);
    let nalu = parser.parse_nalu(&idr).unwrap().unwrap();
    assert!(nalu.is_idr());
    assert_eq!(nalu.nal_ref_idc, 3);

    assert!(parser.parse_nalu(&Bytes::new()).unwrap().is_none());
}
