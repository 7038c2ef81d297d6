//! Per-feed pipelines and their lifecycle.
//!
//! Every configured feed runs as its own tokio task:
//!
//! ```text
//! Configured -> SocketBound -> PackagerStarted -> Ingesting -> Stopped | Failed
//! ```
//!
//! A failing feed never affects the others. State changes are published on a
//! `tokio::sync::watch` channel per feed.

use crate::av::{AudioAccessUnits, CodecType, TimestampNormalizer, Track, VideoAccessUnit};
use crate::codec::aac::AACConfig;
use crate::config::{Config, FeedDescriptor};
use crate::error::{Result, UdpHlsError};
use crate::format::hls::{Packager, PackagerConfig, VariantRegistry};
use crate::format::ts::TSReader;
use crate::format::udp::UdpSource;
use crate::format::AccessUnitSink;
use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Configured,
    SocketBound,
    PackagerStarted,
    Ingesting,
    Stopped,
    Failed(String),
}

impl FeedState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Stopped | FeedState::Failed(_))
    }

    /// Setup is over once the packager is registered or the feed has ended.
    pub fn setup_finished(&self) -> bool {
        matches!(self, FeedState::PackagerStarted | FeedState::Ingesting) || self.is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FeedState::Failed(_))
    }
}

/// Sink that normalizes timestamps and forwards access units to a packager.
///
/// Video and audio share one clock, so both tracks stay in the same timeline.
pub struct FeedPipeline {
    name: String,
    packager: Arc<Packager>,
    clock: TimestampNormalizer,
}

impl FeedPipeline {
    pub fn new(name: impl Into<String>, packager: Arc<Packager>) -> Self {
        Self {
            name: name.into(),
            packager,
            clock: TimestampNormalizer::new(),
        }
    }
}

#[async_trait::async_trait]
impl AccessUnitSink for FeedPipeline {
    async fn on_video(&mut self, track: &Track, unit: VideoAccessUnit) -> Result<()> {
        let pts = self.clock.decode(unit.pts);
        let dts = match unit.dts {
            Some(dts) => self.clock.decode(dts),
            None => pts,
        };
        trace!(
            "{}: video pid {} pts {} dts {} ({} NAL units)",
            self.name,
            track.pid,
            pts,
            dts,
            unit.nalus.len()
        );
        self.packager
            .write_h264(Utc::now(), pts, dts, unit.nalus)
            .await
    }

    async fn on_audio(&mut self, track: &Track, unit: AudioAccessUnits) -> Result<()> {
        let pts = self.clock.decode(unit.pts);
        trace!(
            "{}: audio pid {} pts {} ({} frames)",
            self.name,
            track.pid,
            pts,
            unit.frames.len()
        );
        self.packager
            .write_aac(Utc::now(), pts, &unit.config, &unit.frames)
            .await
    }
}

/// Packager settings for one feed under the effective configuration.
pub fn packager_config(config: &Config, feed: &FeedDescriptor) -> PackagerConfig {
    PackagerConfig::new(feed.name.clone())
        .with_directory(config.directory.clone())
        .with_segment_count(config.segment_count)
        .with_segment_duration(config.segment_duration)
        .with_audio(config.audio.then(AACConfig::default))
        .with_variant(feed.resolution.clone(), feed.bandwidth)
}

/// Demultiplexes `source` into `packager` until the stream ends or fails.
pub async fn ingest<R>(name: &str, source: R, packager: Arc<Packager>) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let reader = attach(name, source, &packager).await?;
    pump(name, reader, packager).await
}

/// Waits for the PMT and subscribes the video track and, when declared, the audio track.
pub async fn attach<R>(name: &str, source: R, packager: &Packager) -> Result<TSReader<R>>
where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = TSReader::new(source).await?;
    let tracks = reader.tracks().to_vec();

    let video = tracks
        .iter()
        .find(|t| t.codec == CodecType::H264)
        .cloned()
        .ok_or(UdpHlsError::NoVideoTrack)?;
    reader.subscribe(&video);

    let audio = tracks.iter().find(|t| t.codec == CodecType::AAC).cloned();
    let audio_declared = packager.config().audio.is_some();
    match (&audio, audio_declared) {
        (Some(track), true) => reader.subscribe(track),
        (None, true) => {
            warn!("{}: AAC audio declared but the stream has none, serving video only", name);
            packager.disable_audio().await;
        }
        (Some(track), false) => debug!("{}: ignoring audio track on PID {}", name, track.pid),
        (None, false) => {}
    }
    info!(
        "{}: ingesting video PID {}{}",
        name,
        video.pid,
        match (&audio, audio_declared) {
            (Some(track), true) => format!(", audio PID {}", track.pid),
            _ => String::new(),
        }
    );
    Ok(reader)
}

/// Reads `reader` to the end of the stream.
pub async fn pump<R>(name: &str, mut reader: TSReader<R>, packager: Arc<Packager>) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut pipeline = FeedPipeline::new(name, packager);
    loop {
        match reader.read(&mut pipeline).await {
            Ok(()) => {}
            Err(UdpHlsError::EndOfStream) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// A running feed as seen from outside its task.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    pub descriptor: FeedDescriptor,
    pub packager: Arc<Packager>,
    pub state: watch::Receiver<FeedState>,
}

impl FeedHandle {
    pub fn current_state(&self) -> FeedState {
        self.state.borrow().clone()
    }
}

pub struct Supervisor {
    registry: Arc<VariantRegistry>,
    cancel: CancellationToken,
    feeds: Vec<FeedHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(registry: Arc<VariantRegistry>, cancel: CancellationToken) -> Self {
        Self {
            registry,
            cancel,
            feeds: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn feeds(&self) -> &[FeedHandle] {
        &self.feeds
    }

    /// Spawns one task per configured feed.
    pub fn spawn_all(&mut self, config: &Config) {
        for feed in &config.feeds {
            self.spawn_feed(feed.clone(), packager_config(config, feed));
        }
    }

    pub fn spawn_feed(&mut self, descriptor: FeedDescriptor, config: PackagerConfig) {
        let packager = Arc::new(Packager::new(config));
        let (tx, rx) = watch::channel(FeedState::Configured);

        let task = tokio::spawn(run_feed(
            descriptor.clone(),
            packager.clone(),
            self.registry.clone(),
            tx,
            self.cancel.child_token(),
        ));

        self.feeds.push(FeedHandle {
            descriptor,
            packager,
            state: rx,
        });
        self.tasks.push(task);
    }

    /// Waits until every feed has finished setup and returns the descriptors
    /// of the feeds whose packager is registered, in configuration order.
    pub async fn wait_for_setup(&self) -> Vec<FeedDescriptor> {
        for feed in &self.feeds {
            let mut state = feed.state.clone();
            // a closed channel means the task is gone
            let _ = state.wait_for(FeedState::setup_finished).await;
        }

        self.feeds
            .iter()
            .filter(|feed| {
                self.registry
                    .get(&feed.descriptor.name)
                    .map_or(false, |p| Arc::ptr_eq(&p, &feed.packager))
            })
            .map(|feed| feed.descriptor.clone())
            .collect()
    }

    /// Resolves once every feed has reached a terminal state.
    pub async fn all_terminated(&self) {
        let waits = self.feeds.iter().map(|feed| {
            let mut state = feed.state.clone();
            async move {
                let _ = state.wait_for(FeedState::is_terminal).await;
            }
        });
        join_all(waits).await;
    }

    /// Cancels every feed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for all feed tasks and returns their final states.
    pub async fn join(self) -> Vec<(String, FeedState)> {
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!("feed task panicked: {}", e);
            }
        }
        self.feeds
            .iter()
            .map(|feed| (feed.descriptor.name.clone(), feed.current_state()))
            .collect()
    }
}

async fn run_feed(
    descriptor: FeedDescriptor,
    packager: Arc<Packager>,
    registry: Arc<VariantRegistry>,
    state: watch::Sender<FeedState>,
    cancel: CancellationToken,
) {
    let name = descriptor.name.clone();
    let result = tokio::select! {
        result = setup_and_ingest(&descriptor, &packager, &registry, &state) => result,
        _ = cancel.cancelled() => Ok(()),
    };

    if let Err(e) = packager.close().await {
        warn!("{}: failed to finalize playlist: {}", name, e);
    }

    match result {
        Ok(()) => {
            info!("feed {} stopped", name);
            state.send_replace(FeedState::Stopped);
        }
        Err(e) => {
            error!("feed {} failed: {}", name, e);
            state.send_replace(FeedState::Failed(e.to_string()));
        }
    }
}

async fn setup_and_ingest(
    descriptor: &FeedDescriptor,
    packager: &Arc<Packager>,
    registry: &VariantRegistry,
    state: &watch::Sender<FeedState>,
) -> Result<()> {
    let source = UdpSource::bind(&descriptor.address).await?;
    state.send_replace(FeedState::SocketBound);

    // a duplicate name must fail before its packager touches the shared directory
    registry.register(&descriptor.name, packager.clone())?;
    if let Err(e) = packager.start().await {
        registry.remove(&descriptor.name, packager);
        return Err(e);
    }
    state.send_replace(FeedState::PackagerStarted);

    let reader = attach(&descriptor.name, source, packager).await?;
    state.send_replace(FeedState::Ingesting);

    pump(&descriptor.name, reader, packager.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::tests::program_tables;
    use crate::format::ts::{TSMuxer, PID_AUDIO, PID_VIDEO, STREAM_TYPE_AAC};
    use bytes::{Bytes, BytesMut};
    use std::time::Duration;

    fn feed(address: &str, name: &str) -> FeedDescriptor {
        FeedDescriptor {
            address: address.into(),
            name: name.into(),
            resolution: "640x360".into(),
            bandwidth: 200_000,
        }
    }

    fn idr_stream() -> Vec<u8> {
        let mut muxer = TSMuxer::new(false);
        let mut out = BytesMut::new();
        muxer.write_tables(&mut out);
        let idr = crate::codec::h264::join_annexb(&[
            Bytes::from_static(&[0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6, 0x40]),
            Bytes::from_static(&[0x68, 0xCE, 0x38, 0x80]),
            Bytes::from_static(&[0x65, 0x88, 0x84]),
        ]);
        // raw PTS near the top of the 33-bit range wraps during the stream
        let base = (1u64 << 33) - 45_000;
        for i in 0..3u64 {
            let ts = (base + i * 90_000) & ((1 << 33) - 1);
            muxer.write_video(&mut out, ts, ts, idr.clone(), true);
        }
        out.to_vec()
    }

    #[tokio::test]
    async fn test_ingest_normalizes_across_wraparound() {
        let packager = Arc::new(Packager::new(
            PackagerConfig::new("cam").with_variant("640x360", 1),
        ));
        packager.start().await.unwrap();

        let source = tokio_test::io::Builder::new().read(&idr_stream()).build();
        ingest("cam", source, packager.clone()).await.unwrap();

        // the third IDR closes the first two one-second segments
        assert_eq!(
            packager.segment_names(),
            vec!["cam_0.ts".to_string(), "cam_1.ts".to_string()]
        );
        let playlist = String::from_utf8(packager.playlist().to_vec()).unwrap();
        assert_eq!(playlist.matches("#EXTINF:1.00000,").count(), 2);
    }

    #[tokio::test]
    async fn test_stream_without_video_fails() {
        let packager = Arc::new(Packager::new(PackagerConfig::new("cam")));
        packager.start().await.unwrap();
        let source = tokio_test::io::Builder::new()
            .read(&program_tables(&[(STREAM_TYPE_AAC, PID_AUDIO)]))
            .build();
        let result = ingest("cam", source, packager).await;
        assert!(matches!(result, Err(UdpHlsError::NoVideoTrack)));
    }

    #[tokio::test]
    async fn test_stream_with_only_unknown_codecs_fails() {
        let packager = Arc::new(Packager::new(PackagerConfig::new("cam")));
        packager.start().await.unwrap();
        // MPEG-2 video and MPEG-1 audio
        let source = tokio_test::io::Builder::new()
            .read(&program_tables(&[(0x02, PID_VIDEO), (0x03, PID_AUDIO)]))
            .build();
        let result = ingest("cam", source, packager).await;
        assert!(matches!(result, Err(UdpHlsError::NoVideoTrack)));
    }

    #[tokio::test]
    async fn test_bind_failure_fails_only_that_feed() {
        let blocker = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap().to_string();

        let registry = Arc::new(VariantRegistry::new());
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::new(registry.clone(), cancel.clone());
        let config = Config::default();
        for descriptor in [feed(&taken, "blocked"), feed("127.0.0.1:0", "free")] {
            let packager = packager_config(&config, &descriptor);
            supervisor.spawn_feed(descriptor, packager);
        }

        let ready = tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_setup())
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "free");
        assert!(supervisor.feeds()[0].current_state().is_failed());
        // no data has arrived, so track discovery is still pending
        assert_eq!(
            supervisor.feeds()[1].current_state(),
            FeedState::PackagerStarted
        );
        assert!(registry.lookup("/stream_360p.m3u8").is_some());

        supervisor.shutdown();
        let states = supervisor.join().await;
        assert!(states[0].1.is_failed());
        assert_eq!(states[1].1, FeedState::Stopped);
    }

    #[tokio::test]
    async fn test_duplicate_name_fails_second_feed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(VariantRegistry::new());
        let mut supervisor = Supervisor::new(registry.clone(), CancellationToken::new());
        let config = Config {
            directory: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let first = feed("127.0.0.1:0", "cam");
        supervisor.spawn_feed(first.clone(), packager_config(&config, &first));
        let ready = supervisor.wait_for_setup().await;
        assert_eq!(ready.len(), 1);
        let serving = registry.get("cam").unwrap();

        let second = feed("127.0.0.1:0", "cam");
        supervisor.spawn_feed(second.clone(), packager_config(&config, &second));
        let ready = supervisor.wait_for_setup().await;
        assert_eq!(ready.len(), 1);
        match supervisor.feeds()[1].current_state() {
            FeedState::Failed(reason) => assert!(reason.contains("already registered")),
            other => panic!("unexpected state {:?}", other),
        }
        // the rejected feed never wrote over the running variant's playlist
        assert!(Arc::ptr_eq(&registry.get("cam").unwrap(), &serving));
        let on_disk = std::fs::read_to_string(dir.path().join("stream_360p.m3u8")).unwrap();
        assert!(!on_disk.contains("#EXT-X-ENDLIST"));

        supervisor.shutdown();
        supervisor.join().await;
    }
}
