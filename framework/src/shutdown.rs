//! Out-of-band stop trigger: the first connection accepted on the shutdown
//! port ends the accept loop.

use std::io;
use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::diagnostics::Diagnostics;
use crate::error::{Result, ServerError};
use crate::state::ShutdownHandle;

const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

pub(crate) struct ShutdownListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ShutdownListener {
    pub(crate) fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind {
                port: addr.port(),
                source,
            })?;
        let addr = listener.local_addr()?;

        Ok(Self { listener, addr })
    }

    /// Runs the blocking accept on its own thread.
    pub(crate) fn spawn(
        self,
        handle: ShutdownHandle,
        diagnostics: Arc<Diagnostics>,
    ) -> io::Result<ArmedShutdown> {
        let addr = self.addr;
        let thread = thread::Builder::new()
            .name(format!("shutdown-{}", addr.port()))
            .spawn(move || self.run(&handle, &diagnostics))?;

        Ok(ArmedShutdown { addr, thread })
    }

    fn run(self, handle: &ShutdownHandle, diagnostics: &Diagnostics) {
        diagnostics.information(format!(
            "Shutdown listener started on {}",
            self.addr
        ));

        loop {
            match self.listener.accept() {
                // TODO: check a configurable shared secret before honouring
                // the request; any connection is a stop signal for now.
                Ok((_stream, peer)) => {
                    if handle.is_stopped() {
                        diagnostics.verbose("Shutdown listener released");
                    } else {
                        diagnostics
                            .warning(format!("Shutdown requested by {peer}"));
                        handle.stop();
                    }
                    break;
                }
                Err(_) if handle.is_stopped() => break,
                Err(e) if is_transient(e.kind()) => {
                    diagnostics.warning(format!(
                        "Shutdown listener accept failed, retrying: {e}"
                    ));
                    thread::sleep(ACCEPT_RETRY);
                }
                Err(e) => {
                    diagnostics
                        .error(format!("Shutdown listener failed: {e}"));
                    break;
                }
            }
        }

        drop(self.listener);
        diagnostics
            .verbose(format!("Shutdown listener on {} closed", self.addr));
    }
}

/// Accept errors caused by a single peer or a momentary resource shortage.
/// The listening socket itself is still usable afterwards.
const fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::OutOfMemory
            | io::ErrorKind::Other
    )
}

/// A shutdown listener thread that may still be blocked in `accept`.
pub(crate) struct ArmedShutdown {
    addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl ArmedShutdown {
    /// Unblocks the listener if it never fired and waits for its thread.
    pub(crate) fn release(self, diagnostics: &Diagnostics) {
        if !self.thread.is_finished() {
            let target =
                SocketAddr::new(connectable(self.addr.ip()), self.addr.port());
            // Refused means the listener already closed on its own.
            match TcpStream::connect_timeout(&target, RELEASE_TIMEOUT) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {}
                Err(e) => {
                    diagnostics.warning(format!(
                        "Failed to release shutdown listener: {e}"
                    ));
                    return;
                }
            }
        }

        if self.thread.join().is_err() {
            diagnostics.error("Shutdown listener thread panicked");
        }
    }
}

fn connectable(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        IpAddr::V6(v6) if v6.is_unspecified() => {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        }
        other => other,
    }
}
