use thiserror::Error;

#[derive(Error, Debug)]
pub enum UdpHlsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("variant {0:?} is already registered")]
    DuplicateVariant(String),

    #[error("no H.264 video track found")]
    NoVideoTrack,

    #[error("packager {0:?} already started")]
    AlreadyStarted(String),

    #[error("packager {0:?} is not started")]
    NotStarted(String),

    #[error("no feed is running")]
    NoViableFeeds,

    #[error("end of stream")]
    EndOfStream,
}

pub type Result<T> = std::result::Result<T, UdpHlsError>;
