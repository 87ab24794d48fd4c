use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Line echo client")]
pub struct Args {
    /// Seconds to wait for connects and replies
    #[arg(short, long, default_value = "5", global = true)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send each line and print the server's reply
    Send {
        #[arg(short, long, default_value = "127.0.0.1:65000")]
        addr: SocketAddr,

        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Ask a server to shut down by connecting to its shutdown port
    Stop {
        #[arg(short, long, default_value = "127.0.0.1:65001")]
        addr: SocketAddr,
    },
}

impl Args {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
