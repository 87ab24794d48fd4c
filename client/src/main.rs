mod client;
mod config;

use anyhow::Result;
use clap::Parser;
use client::{request_shutdown, EchoClient};
use config::{Args, Command};
use log::error;

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let args = Args::parse();
    let timeout = args.timeout();

    let result = match args.command {
        Command::Send { addr, lines } => {
            EchoClient::new(addr, timeout).exchange(&lines).map(|replies| {
                for reply in replies {
                    println!("{reply}");
                }
            })
        }
        Command::Stop { addr } => request_shutdown(addr, timeout),
    };

    if let Err(e) = &result {
        error!("Client error: {e:#}");
    }
    result
}
