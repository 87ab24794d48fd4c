use anyhow::Result;
use std::io::{BufRead, Write};

/// Protocol logic run once per accepted connection.
///
/// `reader` yields the client's bytes line by line; `writer` flushes on every
/// newline. Returning ends the interaction and the connection is closed.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// # Errors
    ///
    /// Any error is logged by the dispatcher; it never affects other clients.
    fn handle(
        &self,
        reader: &mut dyn BufRead,
        writer: &mut dyn Write,
    ) -> Result<()>;
}

impl<F> ConnectionHandler for F
where
    F: Fn(&mut dyn BufRead, &mut dyn Write) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        reader: &mut dyn BufRead,
        writer: &mut dyn Write,
    ) -> Result<()> {
        self(reader, writer)
    }
}

/// Writes every received line straight back until the client hangs up.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl ConnectionHandler for EchoHandler {
    fn handle(
        &self,
        reader: &mut dyn BufRead,
        writer: &mut dyn Write,
    ) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            writeln!(writer, "{line}")?;
            writer.flush()?;
        }
        Ok(())
    }
}
