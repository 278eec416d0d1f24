//! rtun-server: server-side tunnel multiplexer for a remote-desktop virtual
//! channel.
//!
//! Boots with a handle to the shared channel — its inherited stdio in
//! production — and multiplexes TCP connections, reverse listeners, and
//! stdio-attached child processes over it under one-byte tunnel ids
//! (`spec.md` §1).

mod buffer;
mod channel;
mod config;
mod dispatcher;
mod endpoint;
mod engine;
mod event;
mod registry;
#[cfg(test)]
mod scenario_tests;
mod server;
mod tunnel;

use clap::Parser;
use config::ServerConfig;
use server::Server;
use std::path::PathBuf;
use tracing::{error, info};

/// rtun-server — tunnel multiplexer server
#[derive(Parser, Debug)]
#[command(name = "rtun-server", version, about = "Tunnel multiplexer server")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "rtun-server.toml")]
    config: PathBuf,

    /// Capacity, in bytes, of each tunnel's read/write buffer
    #[arg(long)]
    buffer_cap: Option<usize>,

    /// Use a Unix socket as the shared channel instead of stdio — for local
    /// development and testing only; production always uses stdio.
    #[arg(long)]
    channel: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting rtun-server");

    let server_config = match ServerConfig::load(Some(&cli.config), cli.buffer_cap) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let (reader, writer) = match cli.channel {
        Some(path) => match channel::unix_socket_channel(&path).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, path = %path.display(), "failed to open channel socket");
                std::process::exit(1);
            }
        },
        None => channel::stdio_channel(),
    };

    let server = Server::new(reader, writer, server_config);

    match server.run().await {
        Ok(()) => {
            info!("rtun-server stopped");
        }
        Err(e) => {
            error!(error = %e, "rtun-server stopped with a fatal error");
            std::process::exit(1);
        }
    }
}
