mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Args;
use framework::{EchoHandler, Server};
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let args = Args::parse();
    let config = args.configuration()?;
    let server = Server::new(config, EchoHandler)?;
    info!("Starting echo server {}", server.identity());

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down...");
        shutdown.stop();
    })?;

    server.start()?;
    info!("Echo server exited");
    Ok(())
}
