use crate::config::FeedDescriptor;
use log::warn;

/// Header of the master playlist, followed by a blank line.
pub const MASTER_HEADER: &str = "#EXTM3U\n#EXT-X-VERSION:9\n#EXT-X-INDEPENDENT-SEGMENTS\n\n";

/// Codec string advertised for every variant (H.264 constrained baseline, level 3.1).
pub const VARIANT_CODECS: &str = "avc1.42c01f";

/// Frame rate advertised for every variant.
pub const VARIANT_FRAME_RATE: &str = "24.000";

/// Splits `WxH` into width and height; anything without exactly one `x` is rejected.
pub fn split_resolution(resolution: &str) -> Option<(&str, &str)> {
    let mut parts = resolution.split('x');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(width), Some(height), None) => Some((width, height)),
        _ => None,
    }
}

/// Name of the media playlist a variant is linked under.
pub fn media_playlist_name(height: &str) -> String {
    format!("stream_{}p.m3u8", height)
}

/// One `EXT-X-STREAM-INF` block with its playlist link.
pub fn variant_block(bandwidth: u64, resolution: &str) -> Option<String> {
    let (_, height) = split_resolution(resolution)?;
    Some(format!(
        "#EXT-X-STREAM-INF:BANDWIDTH={bw},AVERAGE-BANDWIDTH={bw},CODECS=\"{codecs}\",RESOLUTION={res},FRAME-RATE={fps}\n{link}\n\n",
        bw = bandwidth,
        codecs = VARIANT_CODECS,
        res = resolution,
        fps = VARIANT_FRAME_RATE,
        link = media_playlist_name(height),
    ))
}

/// Builds the master playlist, one block per descriptor in the given order.
pub fn build_master_manifest(descriptors: &[FeedDescriptor]) -> String {
    let mut manifest = String::from(MASTER_HEADER);
    for descriptor in descriptors {
        match variant_block(descriptor.bandwidth, &descriptor.resolution) {
            Some(block) => manifest.push_str(&block),
            None => warn!(
                "feed {}: invalid resolution {:?}, left out of the master playlist",
                descriptor.name, descriptor.resolution
            ),
        }
    }
    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(name: &str, resolution: &str, bandwidth: u64) -> FeedDescriptor {
        FeedDescriptor {
            address: "127.0.0.1:9000".into(),
            name: name.into(),
            resolution: resolution.into(),
            bandwidth,
        }
    }

    #[test]
    fn test_master_manifest_text() {
        let manifest = build_master_manifest(&[feed("low", "640x360", 200000)]);
        assert_eq!(
            manifest,
            "#EXTM3U\n#EXT-X-VERSION:9\n#EXT-X-INDEPENDENT-SEGMENTS\n\n\
             #EXT-X-STREAM-INF:BANDWIDTH=200000,AVERAGE-BANDWIDTH=200000,CODECS=\"avc1.42c01f\",RESOLUTION=640x360,FRAME-RATE=24.000\n\
             stream_360p.m3u8\n\n"
        );
    }

    #[test]
    fn test_manifest_is_deterministic() {
        let feeds = vec![
            feed("low", "640x360", 200000),
            feed("high", "1280x720", 1000000),
        ];
        let first = build_master_manifest(&feeds);
        assert_eq!(first, build_master_manifest(&feeds));
        assert!(first.find("360p").unwrap() < first.find("720p").unwrap());
    }

    #[test]
    fn test_malformed_resolution_is_skipped() {
        let good = build_master_manifest(&[feed("high", "1280x720", 1000000)]);
        let with_bad = build_master_manifest(&[
            feed("broken", "720", 500000),
            feed("high", "1280x720", 1000000),
        ]);
        assert_eq!(good, with_bad);
        assert!(!with_bad.contains("500000"));
    }

    #[test]
    fn test_empty_manifest_is_header_only() {
        assert_eq!(build_master_manifest(&[]), MASTER_HEADER);
    }

    #[test]
    fn test_split_resolution() {
        assert_eq!(split_resolution("1920x1080"), Some(("1920", "1080")));
        assert_eq!(split_resolution("1920"), None);
        assert_eq!(split_resolution("1x2x3"), None);
    }
}
