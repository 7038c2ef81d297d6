//! HTTP front end: landing page, master manifest and per-variant dispatch.

use crate::error::{Result, UdpHlsError};
use crate::format::hls::{VariantRegistry, PLAYLIST_CONTENT_TYPE};
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use log::{debug, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Path of the master manifest, both over HTTP and inside the output directory.
pub const MASTER_MANIFEST_NAME: &str = "video.m3u8";

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<VariantRegistry>,
    /// Master manifest, fixed once setup completes
    pub manifest: Arc<str>,
}

impl AppContext {
    pub fn new(registry: Arc<VariantRegistry>, manifest: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            manifest: manifest.into(),
        }
    }
}

/// Create the Axum router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(landing_page))
        .route(&format!("/{}", MASTER_MANIFEST_NAME), get(master_manifest))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn landing_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn master_manifest(State(ctx): State<AppContext>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        ctx.manifest.to_string(),
    )
}

/// Routes every other path to the packager whose name or alias it contains.
async fn dispatch(
    State(ctx): State<AppContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
        )
            .into_response();
    }

    let path = uri.path();
    match ctx.registry.lookup(path) {
        Some(packager) => packager.serve(path, &headers).await,
        None => {
            debug!("no variant matches {}", path);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Binds the HTTP listener.
pub async fn bind(address: &str) -> Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .map_err(|source| UdpHlsError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Serves `ctx` on `listener` until `shutdown` is cancelled.
pub async fn start_server(
    listener: TcpListener,
    ctx: AppContext,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("serving HLS on http://{}/{}", addr, MASTER_MANIFEST_NAME);
    }

    axum::serve(listener, create_router(ctx))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
