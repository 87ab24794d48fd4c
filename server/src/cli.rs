use anyhow::Result;
use clap::Parser;
use framework::{
    ConfigError, DiagnosticLevel, LogTarget, ServerConfiguration,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line flags override values from the configuration file.
#[derive(Parser, Debug)]
#[command(author, version, about = "Line echo server")]
pub struct Args {
    /// Directory containing TCPConfigFile.toml
    #[arg(short, long)]
    pub config_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Shutdown port (defaults to port + 1)
    #[arg(short = 's', long)]
    pub stop_port: Option<u16>,

    #[arg(short, long)]
    pub name: Option<String>,

    /// off, critical, error, warning, information, verbose or all
    #[arg(short, long)]
    pub level: Option<DiagnosticLevel>,

    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// console, text or structured; repeat or comma-separate
    #[arg(long = "log-target", value_delimiter = ',')]
    pub log_targets: Vec<LogTarget>,

    #[arg(long)]
    pub listen_address: Option<IpAddr>,

    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}

impl Args {
    pub fn configuration(&self) -> Result<ServerConfiguration> {
        let mut config = match &self.config_dir {
            Some(dir) => ServerConfiguration::load_from_dir(dir)?,
            None => ServerConfiguration::default(),
        };

        if let Some(port) = self.port {
            config.listen_port = port;
        }
        match (self.stop_port, self.port) {
            (Some(stop), _) => config.shutdown_port = stop,
            (None, Some(port)) => {
                config.shutdown_port = port
                    .checked_add(1)
                    .ok_or(ConfigError::PortOverflow(port))?;
            }
            (None, None) => {}
        }
        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(level) = self.level {
            config.diagnostic_level = level;
        }
        if let Some(path) = &self.log_path {
            config.log_path.clone_from(path);
        }
        if !self.log_targets.is_empty() {
            config.log_targets.clone_from(&self.log_targets);
        }
        if let Some(address) = self.listen_address {
            config.listen_address = address;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}
