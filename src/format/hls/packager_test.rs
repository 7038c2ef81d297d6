use super::*;
use crate::format::ts::{PID_PAT, TS_PACKET_SIZE};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;

const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6, 0x40];
const PPS: &[u8] = &[0x68, 0xCE, 0x38, 0x80];

fn idr(with_parameter_sets: bool) -> Vec<Bytes> {
    let mut units = Vec::new();
    if with_parameter_sets {
        units.push(Bytes::from_static(SPS));
        units.push(Bytes::from_static(PPS));
    }
    units.push(Bytes::from_static(&[0x65, 0x88, 0x84, 0x21]));
    units
}

fn p_frame() -> Vec<Bytes> {
    vec![Bytes::from_static(&[0x41, 0x9A, 0x22, 0x33])]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn config() -> PackagerConfig {
    PackagerConfig::new("cam").with_variant("1280x720", 1_000_000)
}

/// One second of 30 fps video starting with an IDR at `start`.
async fn write_gop(packager: &Packager, start: i64, parameter_sets: bool) {
    let now = Utc::now();
    packager
        .write_h264(now, start, start, idr(parameter_sets))
        .await
        .unwrap();
    for i in 1..30 {
        let ts = start + i * 3000;
        packager.write_h264(now, ts, ts, p_frame()).await.unwrap();
    }
}

fn segment_bytes(packager: &Packager, name: &str) -> Bytes {
    match packager.index.read().segments.get(name) {
        Some(SegmentData::Memory(data)) => data.clone(),
        other => panic!("segment {} not in memory: {:?}", name, other),
    }
}

#[tokio::test]
async fn test_start_twice_fails() {
    let packager = Packager::new(config());
    packager.start().await.unwrap();
    assert!(matches!(
        packager.start().await,
        Err(UdpHlsError::AlreadyStarted(name)) if name == "cam"
    ));
}

#[tokio::test]
async fn test_serve_before_start_is_not_found() {
    let packager = Packager::new(config());
    let response = packager.serve("/stream_720p.m3u8", &HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_write_before_start_fails() {
    let packager = Packager::new(config());
    let result = packager.write_h264(Utc::now(), 0, 0, idr(true)).await;
    assert!(matches!(result, Err(UdpHlsError::NotStarted(_))));
}

#[tokio::test]
async fn test_segments_cut_on_idr_after_target_duration() {
    let packager = Packager::new(config());
    packager.start().await.unwrap();

    // access units before the first IDR are dropped
    packager
        .write_h264(Utc::now(), 0, 0, p_frame())
        .await
        .unwrap();
    write_gop(&packager, 3000, true).await;
    write_gop(&packager, 93_000, false).await;

    assert_eq!(packager.segment_names(), vec!["cam_0.ts".to_string()]);
    let playlist = String::from_utf8(packager.playlist().to_vec()).unwrap();
    assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:0\n"));
    assert!(playlist.contains("#EXT-X-PROGRAM-DATE-TIME:"));
    assert!(playlist.contains("#EXTINF:1.00000,\ncam_0.ts\n"));

    let segment = segment_bytes(&packager, "cam_0.ts");
    assert_eq!(segment.len() % TS_PACKET_SIZE, 0);
    assert_eq!(segment[0], 0x47);
    assert_eq!(((segment[1] as u16 & 0x1F) << 8) | segment[2] as u16, PID_PAT);
    assert!(contains(&segment, SPS));
    assert!(contains(&segment, &[0, 0, 0, 1, 0x09, 0xF0]));

    packager.close().await.unwrap();
    assert_eq!(packager.segment_names().len(), 2);
    let playlist = String::from_utf8(packager.playlist().to_vec()).unwrap();
    assert!(playlist.ends_with("#EXT-X-ENDLIST\n"));
}

#[tokio::test]
async fn test_parameter_sets_reinserted_before_idr() {
    let packager = Packager::new(config());
    packager.start().await.unwrap();
    write_gop(&packager, 0, true).await;
    write_gop(&packager, 90_000, false).await;
    packager.close().await.unwrap();

    let second = segment_bytes(&packager, "cam_1.ts");
    assert!(contains(&second, SPS));
    assert!(contains(&second, PPS));
}

#[tokio::test]
async fn test_audio_follows_first_idr() {
    let packager = Packager::new(config());
    packager.start().await.unwrap();

    let aac = AACConfig::default();
    let frames = vec![Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])];
    packager
        .write_aac(Utc::now(), 0, &aac, &frames)
        .await
        .unwrap();
    write_gop(&packager, 0, true).await;
    packager
        .write_aac(Utc::now(), 3000, &aac, &frames)
        .await
        .unwrap();
    packager.close().await.unwrap();

    let segment = segment_bytes(&packager, "cam_0.ts");
    let mut adts = aac.adts_header(4).to_bytes().to_vec();
    adts.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(segment.windows(adts.len()).filter(|w| *w == adts.as_slice()).count(), 1);
}

#[tokio::test]
async fn test_disk_output_and_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let packager = Packager::new(
        config()
            .with_directory(Some(dir.path().to_path_buf()))
            .with_segment_count(2),
    );
    packager.start().await.unwrap();
    assert!(dir.path().join("stream_720p.m3u8").exists());

    for gop in 0..5 {
        write_gop(&packager, gop * 90_000, gop == 0).await;
    }

    // four finished segments, two kept
    assert!(!dir.path().join("cam_0.ts").exists());
    assert!(!dir.path().join("cam_1.ts").exists());
    assert!(dir.path().join("cam_2.ts").exists());
    assert!(dir.path().join("cam_3.ts").exists());
    assert_eq!(
        packager.segment_names(),
        vec!["cam_2.ts".to_string(), "cam_3.ts".to_string()]
    );

    let on_disk = std::fs::read_to_string(dir.path().join("stream_720p.m3u8")).unwrap();
    assert!(on_disk.contains("#EXT-X-MEDIA-SEQUENCE:2\n"));
    assert!(!on_disk.contains("cam_1.ts"));
}

#[tokio::test]
async fn test_serve_playlist_segments_and_ranges() {
    let packager = Packager::new(config());
    packager.start().await.unwrap();
    write_gop(&packager, 0, true).await;
    packager.close().await.unwrap();

    let response = packager.serve("/stream_720p.m3u8", &HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );

    let full = segment_bytes(&packager, "cam_0.ts");
    let mut headers = HeaderMap::new();
    headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-187"));
    let response = packager.serve("/cam_0.ts", &headers).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        format!("bytes 0-187/{}", full.len()).as_str()
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, full.slice(0..188));

    headers.insert(header::RANGE, HeaderValue::from_static("bytes=999999-"));
    let response = packager.serve("/cam_0.ts", &headers).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    let response = packager.serve("/cam_7.ts", &HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_manifest_fragment_and_names() {
    let packager = Packager::new(config());
    assert_eq!(packager.label().as_deref(), Some("720p"));
    assert_eq!(packager.config().playlist_name(), "stream_720p.m3u8");
    let fragment = packager.manifest_fragment().unwrap();
    assert!(fragment.starts_with("#EXT-X-STREAM-INF:BANDWIDTH=1000000,"));
    assert!(fragment.contains("\nstream_720p.m3u8\n"));

    let odd = Packager::new(PackagerConfig::new("odd").with_variant("720", 1));
    assert!(odd.manifest_fragment().is_none());
    assert_eq!(odd.config().playlist_name(), "stream_odd.m3u8");
}

#[test]
fn test_resolution_mismatch() {
    assert!(!resolution_mismatch((1280, 720), "1280x720"));
    assert!(resolution_mismatch((640, 480), "1280x720"));
    assert!(!resolution_mismatch((640, 480), "720"));
}
