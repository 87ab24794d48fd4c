use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a
/// [`ServerConfiguration`](crate::ServerConfiguration).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Ports must be non-zero and distinct.
    #[error("invalid ports: listen port {listen}, shutdown port {shutdown}")]
    InvalidPorts { listen: u16, shutdown: u16 },

    #[error("listen port {0} leaves no room for a default shutdown port")]
    PortOverflow(u16),
}

/// Errors that abort server construction or startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open log destination {}: {source}", path.display())]
    Diagnostics {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;
