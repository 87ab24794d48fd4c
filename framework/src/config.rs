//! Server configuration: defaults, explicit values, and the
//! `TCPConfigFile.toml` loader.
//!
//! A configuration file only overrides the keys it names:
//!
//! ```toml
//! ServerPort = 7000
//! ServerName = "echo"
//! DebugLevel = "warning"
//! LogFilesPath = "/var/log/echo"
//! LogTargets = ["console", "text", "structured"]
//! ```

use serde::Deserialize;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::diagnostics::DiagnosticLevel;
use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "TCPConfigFile.toml";

const DEFAULT_PORT: u16 = 65000;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A destination the diagnostics sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Console,
    Text,
    Structured,
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "text" | "txt" => Ok(Self::Text),
            "structured" | "json" => Ok(Self::Structured),
            other => Err(format!("Unknown log target: {other}")),
        }
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => write!(f, "console"),
            Self::Text => write!(f, "text"),
            Self::Structured => write!(f, "structured"),
        }
    }
}

/// The fixed name and ports of a server, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    name: String,
    listen_port: u16,
    shutdown_port: u16,
}

impl ServerIdentity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub const fn shutdown_port(&self) -> u16 {
        self.shutdown_port
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (listen {}, shutdown {})",
            self.name, self.listen_port, self.shutdown_port
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfiguration {
    pub listen_port: u16,
    pub shutdown_port: u16,
    pub name: String,
    pub diagnostic_level: DiagnosticLevel,
    /// Directory the text and structured log files are written to.
    pub log_path: PathBuf,
    pub listen_address: IpAddr,
    /// How long the accept loop waits when no client is pending.
    pub poll_interval: Duration,
    pub log_targets: Vec<LogTarget>,
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            shutdown_port: DEFAULT_PORT + 1,
            name: String::new(),
            diagnostic_level: DiagnosticLevel::All,
            log_path: PathBuf::from("."),
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_targets: vec![LogTarget::Console],
        }
    }
}

/// On-disk shape of `TCPConfigFile.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigFile {
    server_port: Option<u16>,
    stop_server_port: Option<u16>,
    server_name: Option<String>,
    debug_level: Option<String>,
    log_files_path: Option<PathBuf>,
    listen_address: Option<IpAddr>,
    poll_interval_ms: Option<u64>,
    log_targets: Option<Vec<LogTarget>>,
}

impl ServerConfiguration {
    /// Configuration for `port` with the shutdown port at `port + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PortOverflow`] for port 65535.
    pub fn new(
        port: u16,
        name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            listen_port: port,
            shutdown_port: default_shutdown_port(port)?,
            name: name.into(),
            ..Self::default()
        })
    }

    /// Loads `dir/TCPConfigFile.toml` on top of the defaults.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] with the full expected path if the file
    ///   does not exist
    /// - [`ConfigError::Read`] / [`ConfigError::Parse`] if it cannot be read
    ///   or is not valid TOML
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound(path.clone())
            } else {
                ConfigError::Read {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        Self::parse(&contents, &path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::default().merge(file)
    }

    fn merge(mut self, file: ConfigFile) -> Result<Self, ConfigError> {
        if let Some(port) = file.server_port {
            self.listen_port = port;
        }
        match (file.stop_server_port, file.server_port) {
            (Some(stop), _) => self.shutdown_port = stop,
            (None, Some(port)) => {
                self.shutdown_port = default_shutdown_port(port)?;
            }
            (None, None) => {}
        }
        if let Some(name) = file.server_name {
            self.name = name;
        }
        if let Some(level) = file.debug_level {
            self.diagnostic_level = DiagnosticLevel::parse_lenient(&level);
        }
        if let Some(path) = file.log_files_path {
            self.log_path = path;
        }
        if let Some(address) = file.listen_address {
            self.listen_address = address;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(targets) = file.log_targets {
            self.log_targets = targets;
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_shutdown_port(mut self, port: u16) -> Self {
        self.shutdown_port = port;
        self
    }

    #[must_use]
    pub fn with_diagnostic_level(mut self, level: DiagnosticLevel) -> Self {
        self.diagnostic_level = level;
        self
    }

    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    #[must_use]
    pub fn with_log_targets(
        mut self,
        targets: impl IntoIterator<Item = LogTarget>,
    ) -> Self {
        self.log_targets = targets.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_listen_address(mut self, address: IpAddr) -> Self {
        self.listen_address = address;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validates the ports and freezes name and ports into an identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPorts`] if either port is zero or both
    /// are equal.
    pub fn identity(&self) -> Result<ServerIdentity, ConfigError> {
        if self.listen_port == 0
            || self.shutdown_port == 0
            || self.listen_port == self.shutdown_port
        {
            return Err(ConfigError::InvalidPorts {
                listen: self.listen_port,
                shutdown: self.shutdown_port,
            });
        }

        Ok(ServerIdentity {
            name: self.name.clone(),
            listen_port: self.listen_port,
            shutdown_port: self.shutdown_port,
        })
    }

    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    pub const fn shutdown_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.shutdown_port)
    }

    pub fn text_log_file(&self) -> PathBuf {
        self.log_path.join(format!("{}-Log.txt", self.name))
    }

    pub fn structured_log_file(&self) -> PathBuf {
        self.log_path.join(format!("{}-Log.json", self.name))
    }
}

fn default_shutdown_port(port: u16) -> Result<u16, ConfigError> {
    port.checked_add(1).ok_or(ConfigError::PortOverflow(port))
}
