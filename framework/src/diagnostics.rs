//! Diagnostics sink: severity-filtered events fanned out to the console
//! (through the `log` facade), a plain-text file and a JSON-lines file.

use chrono::{SecondsFormat, Utc};
use log::warn;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{LogTarget, ServerConfiguration};
use crate::error::{Result, ServerError};

const LOG_TARGET: &str = "framework::diagnostics";

/// Severity of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Information,
    Verbose,
}

impl Severity {
    const fn rank(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::Error => 2,
            Self::Warning => 3,
            Self::Information => 4,
            Self::Verbose => 5,
        }
    }

    const fn log_level(self) -> log::Level {
        match self {
            Self::Critical | Self::Error => log::Level::Error,
            Self::Warning => log::Level::Warn,
            Self::Information => log::Level::Info,
            Self::Verbose => log::Level::Debug,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Critical => "Critical",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
            Self::Verbose => "Verbose",
        };
        f.pad(name)
    }
}

/// Minimum verbosity a sink lets through, from `Off` to `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DiagnosticLevel {
    Off,
    Critical,
    Error,
    Warning,
    Information,
    Verbose,
    #[default]
    All,
}

impl DiagnosticLevel {
    /// Parses a level name, falling back to [`DiagnosticLevel::All`].
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Critical => 1,
            Self::Error => 2,
            Self::Warning => 3,
            Self::Information => 4,
            Self::Verbose => 5,
            Self::All => 6,
        }
    }

    pub const fn allows(self, severity: Severity) -> bool {
        severity.rank() <= self.rank()
    }
}

impl FromStr for DiagnosticLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "critical" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "information" | "info" => Ok(Self::Information),
            "verbose" => Ok(Self::Verbose),
            "all" => Ok(Self::All),
            other => Err(format!("Unknown diagnostic level: {other}")),
        }
    }
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "Off",
            Self::Critical => "Critical",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
            Self::Verbose => "Verbose",
            Self::All => "All",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize)]
struct Event<'a> {
    timestamp: String,
    severity: Severity,
    source: &'a str,
    message: &'a str,
}

trait Destination: Send {
    fn write(&mut self, event: &Event<'_>) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn describe(&self) -> String;
}

struct Console;

impl Destination for Console {
    fn write(&mut self, event: &Event<'_>) -> io::Result<()> {
        log::log!(
            target: LOG_TARGET,
            event.severity.log_level(),
            "[{}] {}",
            event.source,
            event.message
        );
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "console".to_string()
    }
}

struct TextFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Destination for TextFile {
    fn write(&mut self, event: &Event<'_>) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} {:<11} [{}] {}",
            event.timestamp, event.severity, event.source, event.message
        )
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

struct StructuredFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Destination for StructuredFile {
    fn write(&mut self, event: &Event<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let open = || -> io::Result<File> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    };

    open().map(BufWriter::new).map_err(|source| ServerError::Diagnostics {
        path: path.to_path_buf(),
        source,
    })
}

/// Thread-safe event sink shared by the dispatcher and every client thread.
pub struct Diagnostics {
    source: String,
    level: DiagnosticLevel,
    destinations: Mutex<Vec<Box<dyn Destination>>>,
}

impl Diagnostics {
    /// Opens every destination named in the configuration. The listen port
    /// is used as the event source.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Diagnostics`] if a log file cannot be opened.
    pub fn open(config: &ServerConfiguration) -> Result<Self> {
        let mut destinations: Vec<Box<dyn Destination>> = Vec::new();

        for target in &config.log_targets {
            match target {
                LogTarget::Console => destinations.push(Box::new(Console)),
                LogTarget::Text => {
                    let path = config.text_log_file();
                    let writer = open_append(&path)?;
                    destinations.push(Box::new(TextFile { path, writer }));
                }
                LogTarget::Structured => {
                    let path = config.structured_log_file();
                    let writer = open_append(&path)?;
                    destinations
                        .push(Box::new(StructuredFile { path, writer }));
                }
            }
        }

        Ok(Self {
            source: config.listen_port.to_string(),
            level: config.diagnostic_level,
            destinations: Mutex::new(destinations),
        })
    }

    /// A sink with no destinations.
    pub fn disabled() -> Self {
        Self {
            source: String::new(),
            level: DiagnosticLevel::Off,
            destinations: Mutex::new(Vec::new()),
        }
    }

    pub const fn level(&self) -> DiagnosticLevel {
        self.level
    }

    pub fn emit(&self, severity: Severity, message: impl fmt::Display) {
        if !self.level.allows(severity) {
            return;
        }

        let message = message.to_string();
        let event = Event {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            severity,
            source: &self.source,
            message: &message,
        };

        let mut destinations = self.destinations.lock();
        for destination in destinations.iter_mut() {
            if let Err(e) = destination.write(&event) {
                warn!(
                    target: LOG_TARGET,
                    "Failed to write to {}: {e}",
                    destination.describe()
                );
            }
        }
    }

    pub fn critical(&self, message: impl fmt::Display) {
        self.emit(Severity::Critical, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.emit(Severity::Error, message);
    }

    pub fn warning(&self, message: impl fmt::Display) {
        self.emit(Severity::Warning, message);
    }

    pub fn information(&self, message: impl fmt::Display) {
        self.emit(Severity::Information, message);
    }

    pub fn verbose(&self, message: impl fmt::Display) {
        self.emit(Severity::Verbose, message);
    }

    /// Flushes and releases every destination. Later events are dropped.
    pub fn close(&self) {
        let mut destinations = self.destinations.lock();
        for destination in destinations.iter_mut() {
            if let Err(e) = destination.flush() {
                warn!(
                    target: LOG_TARGET,
                    "Failed to flush {}: {e}",
                    destination.describe()
                );
            }
        }
        destinations.clear();
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("source", &self.source)
            .field("level", &self.level)
            .field("destinations", &self.destinations.lock().len())
            .finish()
    }
}
