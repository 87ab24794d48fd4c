use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

pub struct EchoClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl EchoClient {
    pub const fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Sends every line in turn and collects one reply per line.
    pub fn exchange(&self, lines: &[String]) -> Result<Vec<String>> {
        info!("Connecting to {}", self.addr);
        let mut stream = TcpStream::connect_timeout(&self.addr, self.timeout)
            .with_context(|| format!("Failed to connect to {}", self.addr))?;
        stream.set_read_timeout(Some(self.timeout))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut replies = Vec::with_capacity(lines.len());

        for line in lines {
            debug!("Sending: {line}");
            writeln!(stream, "{line}")?;
            stream.flush()?;

            let mut reply = String::new();
            if reader.read_line(&mut reply)? == 0 {
                return Err(anyhow!("Server closed the connection"));
            }
            replies.push(reply.trim_end_matches(['\r', '\n']).to_string());
        }

        Ok(replies)
    }
}

/// Connecting is the whole request; nothing is sent.
pub fn request_shutdown(addr: SocketAddr, timeout: Duration) -> Result<()> {
    info!("Requesting shutdown via {addr}");
    TcpStream::connect_timeout(&addr, timeout)
        .with_context(|| format!("Failed to reach shutdown port {addr}"))?;
    Ok(())
}
