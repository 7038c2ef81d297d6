//! Process orchestration: feeds first, then the manifest, then HTTP.

use crate::config::Config;
use crate::error::{Result, UdpHlsError};
use crate::format::hls::{build_master_manifest, VariantRegistry};
use crate::server::{self, AppContext, MASTER_MANIFEST_NAME};
use crate::supervisor::Supervisor;
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs every configured feed and the HTTP server until `shutdown` is
/// cancelled or no feed is left running.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    if config.feeds.is_empty() {
        return Err(UdpHlsError::Config("no valid feed configured".into()));
    }
    if !config.invalid_feeds.is_empty() {
        warn!("skipped {} invalid feed record(s)", config.invalid_feeds.len());
    }

    let registry = Arc::new(VariantRegistry::new());
    let mut supervisor = Supervisor::new(registry.clone(), shutdown.child_token());
    supervisor.spawn_all(&config);

    let ready = supervisor.wait_for_setup().await;
    if ready.is_empty() {
        supervisor.shutdown();
        supervisor.join().await;
        return Err(UdpHlsError::NoViableFeeds);
    }
    info!(
        "{} of {} feed(s) ingesting: {}",
        ready.len(),
        config.feeds.len(),
        ready
            .iter()
            .map(|feed| feed.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let manifest = build_master_manifest(&ready);
    if let Some(directory) = &config.directory {
        tokio::fs::write(directory.join(MASTER_MANIFEST_NAME), manifest.as_bytes()).await?;
    }

    let listener = match server::bind(&config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            supervisor.shutdown();
            supervisor.join().await;
            return Err(e);
        }
    };
    let server_shutdown = CancellationToken::new();
    let server = tokio::spawn(server::start_server(
        listener,
        AppContext::new(registry, manifest),
        server_shutdown.clone(),
    ));

    tokio::select! {
        _ = shutdown.cancelled() => info!("shutting down"),
        _ = supervisor.all_terminated() => warn!("every feed has stopped"),
    }

    supervisor.shutdown();
    server_shutdown.cancel();
    let states = supervisor.join().await;
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task panicked: {}", e),
    }

    for (name, state) in &states {
        info!("feed {}: {:?}", name, state);
    }
    if states.iter().all(|(_, state)| state.is_failed()) {
        return Err(UdpHlsError::NoViableFeeds);
    }
    Ok(())
}
