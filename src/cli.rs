use clap::Parser;
use std::path::PathBuf;
use udphls::config::Overrides;

#[derive(Parser, Debug)]
#[command(name = "udphls")]
#[command(author, version, about = "Serve MPEG-TS over UDP feeds as HLS variants")]
pub struct Cli {
    /// Output directory for segments and playlists; segments stay in memory when omitted
    #[arg(long, env = "UDPHLS_DIR")]
    pub dir: Option<PathBuf>,

    /// Comma separated feeds: address|name|resolution|bandwidth
    #[arg(long, env = "UDPHLS_FEEDS")]
    pub udps: Option<String>,

    /// HTTP listen address [default: 0.0.0.0:8080]
    #[arg(long, env = "UDPHLS_LISTEN")]
    pub listen: Option<String>,

    /// Segments kept per variant [default: 999999]
    #[arg(long)]
    pub segment_count: Option<usize>,

    /// Minimum segment length in seconds [default: 1]
    #[arg(long)]
    pub segment_duration: Option<f64>,

    /// Declare video-only variants
    #[arg(long)]
    pub no_audio: bool,

    /// Path to config file
    #[arg(short, long, env = "UDPHLS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write a configuration template and exit
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "udphls.toml")]
    pub write_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            directory: self.dir.clone(),
            feeds: self.udps.clone(),
            listen: self.listen.clone(),
            segment_count: self.segment_count,
            segment_duration_secs: self.segment_duration,
            no_audio: self.no_audio,
        }
    }
}
