use std::time::Duration;
use tokio_util::sync::CancellationToken;
use udphls::app;
use udphls::config::{Config, ConfigFile, Overrides};
use udphls::UdpHlsError;

fn config(feeds: &str) -> Config {
    Config::layered(
        ConfigFile::default(),
        Overrides {
            feeds: Some(feeds.into()),
            listen: Some("127.0.0.1:0".into()),
            ..Default::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_no_feeds_is_an_error() {
    let result = app::run(config("not-a-record"), CancellationToken::new()).await;
    assert!(matches!(result, Err(UdpHlsError::Config(_))));
}

#[tokio::test]
async fn test_all_feeds_failing_is_an_error() {
    let blocker = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let taken = blocker.local_addr().unwrap();
    let feeds = format!("{}|cam|640x360|200000", taken);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        app::run(config(&feeds), CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(UdpHlsError::NoViableFeeds)));
}

#[tokio::test]
async fn test_runs_until_shutdown_and_writes_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("127.0.0.1:0|cam|1280x720|1000000,127.0.0.1:0|bad|720|1");
    config.directory = Some(dir.path().to_path_buf());

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(app::run(config, shutdown.clone()));

    let manifest_path = dir.path().join("video.m3u8");
    for _ in 0..100 {
        if manifest_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let manifest = std::fs::read_to_string(&manifest_path).unwrap();
    assert!(manifest.starts_with("#EXTM3U\n#EXT-X-VERSION:9\n"));
    assert_eq!(manifest.matches("#EXT-X-STREAM-INF").count(), 1);
    assert!(manifest.contains("stream_720p.m3u8"));
    assert!(dir.path().join("stream_720p.m3u8").exists());
}
