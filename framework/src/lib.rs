//! Scaffold for line-oriented TCP servers.
//!
//! A [`Server`] owns the listening socket, runs one thread per client and
//! stops gracefully when anything connects to its shutdown port (by default
//! the listen port plus one). The protocol itself is a [`ConnectionHandler`].
//!
//! ```no_run
//! use framework::{EchoHandler, Server};
//!
//! let server = Server::with_port(6000, "echo", EchoHandler)?;
//! server.start()?;
//! # Ok::<(), framework::ServerError>(())
//! ```

mod config;
mod diagnostics;
mod error;
mod handler;
mod server;
mod shutdown;
mod state;
mod tracker;

pub use config::{
    LogTarget, ServerConfiguration, ServerIdentity, CONFIG_FILE_NAME,
};
pub use diagnostics::{DiagnosticLevel, Diagnostics, Severity};
pub use error::{ConfigError, Result, ServerError};
pub use handler::{ConnectionHandler, EchoHandler};
pub use server::Server;
pub use state::ShutdownHandle;
pub use tracker::{ClientGuard, ClientTracker};
