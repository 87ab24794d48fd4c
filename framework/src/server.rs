use anyhow::Context;
use std::any::Any;
use std::io::{self, BufReader, LineWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::config::{ServerConfiguration, ServerIdentity};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ServerError};
use crate::handler::ConnectionHandler;
use crate::shutdown::ShutdownListener;
use crate::state::{RunningState, ShutdownHandle};
use crate::tracker::ClientTracker;

/// A line-oriented TCP server running one [`ConnectionHandler`] call per
/// client, each on its own thread.
pub struct Server {
    identity: ServerIdentity,
    config: ServerConfiguration,
    handler: Arc<dyn ConnectionHandler>,
    diagnostics: Arc<Diagnostics>,
    state: RunningState,
    clients: ClientTracker,
}

impl Server {
    /// Validates the configuration and opens the diagnostics destinations.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] if the ports are zero or equal
    /// - [`ServerError::Diagnostics`] if a log file cannot be opened
    pub fn new(
        config: ServerConfiguration,
        handler: impl ConnectionHandler,
    ) -> Result<Self> {
        let identity = config.identity()?;
        let diagnostics = Diagnostics::open(&config)?;
        diagnostics.verbose(format!(
            "Server {identity} configured at level {}",
            diagnostics.level()
        ));

        Ok(Self {
            identity,
            config,
            handler: Arc::new(handler),
            diagnostics: Arc::new(diagnostics),
            state: RunningState::new(),
            clients: ClientTracker::new(),
        })
    }

    /// Server on `port` with the shutdown port at `port + 1`.
    ///
    /// # Errors
    ///
    /// See [`Server::new`].
    pub fn with_port(
        port: u16,
        name: impl Into<String>,
        handler: impl ConnectionHandler,
    ) -> Result<Self> {
        Self::new(ServerConfiguration::new(port, name)?, handler)
    }

    /// Server configured from `dir/TCPConfigFile.toml`.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError::NotFound`](crate::ConfigError::NotFound)
    /// naming the full path when the file is missing, otherwise as
    /// [`Server::new`].
    pub fn from_config_dir(
        dir: impl AsRef<Path>,
        handler: impl ConnectionHandler,
    ) -> Result<Self> {
        Self::new(ServerConfiguration::load_from_dir(dir)?, handler)
    }

    pub const fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub const fn config(&self) -> &ServerConfiguration {
        &self.config
    }

    /// Stops the server the same way a connection to the shutdown port does.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.state.handle()
    }

    /// Clients whose handlers are currently running.
    pub fn in_flight(&self) -> ClientTracker {
        self.clients.clone()
    }

    /// Binds both ports and serves clients until a shutdown is requested,
    /// then waits for every in-flight client before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if either port cannot be bound, or
    /// [`ServerError::Io`] if the listener cannot be configured or the
    /// shutdown thread cannot be spawned.
    pub fn start(self) -> Result<()> {
        let listen_addr = self.config.listen_addr();
        let listener =
            TcpListener::bind(listen_addr).map_err(|source| {
                ServerError::Bind {
                    port: listen_addr.port(),
                    source,
                }
            })?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?;

        let shutdown = ShutdownListener::bind(self.config.shutdown_addr())?;
        let armed = shutdown
            .spawn(self.state.handle(), Arc::clone(&self.diagnostics))?;

        self.diagnostics.information(format!(
            "Server {} started on {bound}",
            self.identity.name()
        ));

        self.accept_loop(&listener);
        drop(listener);

        let pending = self.clients.len();
        if pending > 0 {
            self.diagnostics.information(format!(
                "Stopped accepting, draining {pending} client(s)"
            ));
        }
        self.clients.wait_idle();
        armed.release(&self.diagnostics);

        self.diagnostics
            .information(format!("Server {} stopped", self.identity.name()));
        self.diagnostics.close();
        Ok(())
    }

    fn accept_loop(&self, listener: &TcpListener) {
        while self.state.is_accepting() {
            match listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.state.back_off(self.config.poll_interval);
                }
                Err(e) => {
                    self.diagnostics
                        .warning(format!("Failed to accept connection: {e}"));
                    self.state.back_off(self.config.poll_interval);
                }
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        self.diagnostics
            .information(format!("Client incoming from {peer}"));

        let guard = self.clients.register(peer);
        let handler = Arc::clone(&self.handler);
        let diagnostics = Arc::clone(&self.diagnostics);

        let spawned = thread::Builder::new()
            .name(format!("client-{peer}"))
            .spawn(move || {
                let _guard = guard;
                serve_client(stream, peer, handler.as_ref(), &diagnostics);
            });

        if let Err(e) = spawned {
            self.diagnostics
                .error(format!("Failed to spawn handler for {peer}: {e}"));
        }
    }
}

fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    handler: &dyn ConnectionHandler,
    diagnostics: &Diagnostics,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handle_client(stream, handler, diagnostics)
    }));

    match outcome {
        Ok(Ok(())) => diagnostics.verbose(format!("Client {peer} done")),
        Ok(Err(e)) => diagnostics.error(format!("Client {peer} failed: {e:#}")),
        Err(payload) => diagnostics.error(format!(
            "Client {peer} handler panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

/// Runs the handler once over a buffered reader and a line-flushing writer.
/// Both halves of the socket are dropped on every exit path.
fn handle_client(
    stream: TcpStream,
    handler: &dyn ConnectionHandler,
    diagnostics: &Diagnostics,
) -> anyhow::Result<()> {
    // Accepted sockets may inherit non-blocking mode from the listener.
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(
        stream
            .try_clone()
            .context("Failed to clone client stream")?,
    );
    let mut writer = LineWriter::new(stream);

    diagnostics.information("Handling client");
    handler.handle(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
