use super::packager::{Packager, SegmentData};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use log::{debug, warn};

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Outcome of interpreting a `Range` header against a body of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    Full,
    /// Inclusive start and end offsets.
    Partial(usize, usize),
    Unsatisfiable,
}

/// Parses a single `bytes=` range; multi-range and malformed headers fall back to the full body.
pub fn parse_range(value: Option<&str>, len: usize) -> ByteRange {
    let Some(spec) = value.and_then(|v| v.trim().strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let Ok(suffix) = last.parse::<usize>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || len == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial(len - suffix.min(len), len - 1);
    }

    let Ok(start) = first.parse::<usize>() else {
        return ByteRange::Full;
    };
    let end = if last.is_empty() {
        len.saturating_sub(1)
    } else {
        match last.parse::<usize>() {
            Ok(end) if end >= start => end.min(len.saturating_sub(1)),
            _ => return ByteRange::Full,
        }
    };
    if start >= len {
        return ByteRange::Unsatisfiable;
    }
    ByteRange::Partial(start, end)
}

impl Packager {
    /// Answers a request for this variant's media playlist or one of its segments.
    pub async fn serve(&self, path: &str, headers: &HeaderMap) -> Response {
        if !self.is_started() {
            return StatusCode::NOT_FOUND.into_response();
        }
        let file = path.rsplit('/').next().unwrap_or(path);

        if file.ends_with(".m3u8") {
            let playlist = self.playlist();
            return (
                [
                    (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                playlist,
            )
                .into_response();
        }

        let stored = self.index.read().segments.get(file).cloned();
        let data = match stored {
            Some(SegmentData::Memory(data)) => data,
            Some(SegmentData::File { path, size }) => match tokio::fs::read(&path).await {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    // evicted between lookup and read
                    debug!("{}: segment {} ({} bytes) unavailable: {}", self.name(), file, size, e);
                    return StatusCode::NOT_FOUND.into_response();
                }
            },
            None => return StatusCode::NOT_FOUND.into_response(),
        };

        let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
        segment_response(data, range)
    }
}

fn segment_response(data: Bytes, range: Option<&str>) -> Response {
    let len = data.len();
    let mut response = match parse_range(range, len) {
        ByteRange::Full => Response::new(Body::from(data)),
        ByteRange::Partial(start, end) => {
            let mut response = Response::new(Body::from(data.slice(start..=end)));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, len)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            response
        }
        ByteRange::Unsatisfiable => {
            warn!("unsatisfiable range {:?} for {} byte segment", range, len);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", len)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            response
        }
    };

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(SEGMENT_CONTENT_TYPE),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range(None, 100), ByteRange::Full);
        assert_eq!(parse_range(Some("bytes=0-9"), 100), ByteRange::Partial(0, 9));
        assert_eq!(parse_range(Some("bytes=90-"), 100), ByteRange::Partial(90, 99));
        assert_eq!(parse_range(Some("bytes=-10"), 100), ByteRange::Partial(90, 99));
        assert_eq!(parse_range(Some("bytes=50-500"), 100), ByteRange::Partial(50, 99));
        assert_eq!(parse_range(Some("bytes=100-"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-0"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-1,5-6"), 100), ByteRange::Full);
        assert_eq!(parse_range(Some("items=0-1"), 100), ByteRange::Full);
    }
}
