use crate::error::{Result, UdpHlsError};
use crate::format::hls::packager::{DEFAULT_SEGMENT_COUNT, DEFAULT_SEGMENT_DURATION};
use log::{debug, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Looked up in order when no configuration file is given.
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./udphls.toml", "./config/udphls.toml"];

/// One configured UDP source: `address|name|resolution|bandwidth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDescriptor {
    pub address: String,
    pub name: String,
    pub resolution: String,
    pub bandwidth: u64,
}

impl FeedDescriptor {
    fn parse(record: &str) -> Option<Self> {
        let fields: Vec<&str> = record.split('|').map(str::trim).collect();
        let [address, name, resolution, bandwidth] = fields.as_slice() else {
            return None;
        };
        if address.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            address: address.to_string(),
            name: name.to_string(),
            resolution: resolution.to_string(),
            bandwidth: bandwidth.parse().ok()?,
        })
    }
}

/// Result of parsing a feed list; invalid records are kept for reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedRecords {
    pub valid: Vec<FeedDescriptor>,
    pub invalid: Vec<String>,
}

/// Parses comma separated feed records, keeping their order.
pub fn parse_feed_records(input: &str) -> FeedRecords {
    let mut records = FeedRecords::default();
    for record in input.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        match FeedDescriptor::parse(record) {
            Some(feed) => records.valid.push(feed),
            None => {
                warn!(
                    "ignoring feed record {:?}: expected address|name|resolution|bandwidth \
                     with a non-empty address and name and a numeric bandwidth",
                    record
                );
                records.invalid.push(record.to_string());
            }
        }
    }
    records
}

/// `feeds` in the configuration file: one comma separated string or a list of records.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedList {
    Joined(String),
    Records(Vec<String>),
}

impl FeedList {
    fn records(&self) -> FeedRecords {
        match self {
            FeedList::Joined(joined) => parse_feed_records(joined),
            FeedList::Records(list) => {
                let mut records = FeedRecords::default();
                for record in list {
                    let parsed = parse_feed_records(record);
                    records.valid.extend(parsed.valid);
                    records.invalid.extend(parsed.invalid);
                }
                records
            }
        }
    }
}

/// Contents of a TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub directory: Option<PathBuf>,
    pub feeds: Option<FeedList>,
    pub listen: Option<String>,
    pub segment_count: Option<usize>,
    pub segment_duration_secs: Option<f64>,
    pub audio: Option<bool>,
}

impl ConfigFile {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            UdpHlsError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        debug!("loaded configuration from {}", path.display());
        Self::parse(&contents)
    }

    /// First file found among the default locations.
    pub fn discover() -> Result<Option<Self>> {
        for path in DEFAULT_CONFIG_PATHS.iter().map(Path::new) {
            if path.exists() {
                return Self::load(path).map(Some);
            }
        }
        Ok(None)
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub directory: Option<PathBuf>,
    pub feeds: Option<String>,
    pub listen: Option<String>,
    pub segment_count: Option<usize>,
    pub segment_duration_secs: Option<f64>,
    pub no_audio: bool,
}

/// Effective configuration after layering overrides, file and defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub directory: Option<PathBuf>,
    pub feeds: Vec<FeedDescriptor>,
    /// Records that could not be parsed, already reported.
    pub invalid_feeds: Vec<String>,
    pub listen: String,
    pub segment_count: usize,
    pub segment_duration: Duration,
    pub audio: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: None,
            feeds: Vec::new(),
            invalid_feeds: Vec::new(),
            listen: DEFAULT_LISTEN.to_string(),
            segment_count: DEFAULT_SEGMENT_COUNT,
            segment_duration: DEFAULT_SEGMENT_DURATION,
            audio: true,
        }
    }
}

impl Config {
    /// Loads `path` (or a file from the default locations) and applies `overrides`.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let file = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::discover()?,
        };
        Self::layered(file.unwrap_or_default(), overrides)
    }

    pub fn layered(file: ConfigFile, overrides: Overrides) -> Result<Self> {
        let defaults = Config::default();

        let records = match (overrides.feeds.as_deref(), &file.feeds) {
            (Some(joined), _) => parse_feed_records(joined),
            (None, Some(list)) => list.records(),
            (None, None) => FeedRecords::default(),
        };

        let segment_count = overrides
            .segment_count
            .or(file.segment_count)
            .unwrap_or(defaults.segment_count);
        if segment_count == 0 {
            return Err(UdpHlsError::Config("segment count must be at least 1".into()));
        }

        let segment_duration = match overrides
            .segment_duration_secs
            .or(file.segment_duration_secs)
        {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
            Some(secs) => {
                return Err(UdpHlsError::Config(format!(
                    "segment duration must be positive, got {}",
                    secs
                )))
            }
            None => defaults.segment_duration,
        };

        Ok(Self {
            directory: overrides.directory.or(file.directory),
            feeds: records.valid,
            invalid_feeds: records.invalid,
            listen: overrides
                .listen
                .or(file.listen)
                .unwrap_or(defaults.listen),
            segment_count,
            segment_duration,
            audio: !overrides.no_audio && file.audio.unwrap_or(defaults.audio),
        })
    }
}

const TEMPLATE: &str = r#"# udphls configuration
# Command line flags and UDPHLS_* environment variables take precedence.

# Directory for segments and playlists; omit to keep segments in memory.
# directory = "/var/lib/udphls"

# One record per feed: address|name|resolution|bandwidth
# Addresses may be host:port or udp://host:port; multicast groups are joined.
feeds = [
    "udp://127.0.0.1:9000|low|640x360|200000",
    "udp://127.0.0.1:9001|high|1280x720|1000000",
]

# HTTP listen address
listen = "0.0.0.0:8080"

# Segments kept per variant before the oldest is deleted
segment_count = 999999

# Minimum segment length in seconds; segments are cut on the next IDR frame
segment_duration_secs = 1.0

# Declare AAC audio for every variant
audio = true
"#;

/// Writes a commented configuration template unless `path` already exists.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, TEMPLATE)?;
    Ok(true)
}
