//! quietd - quiet protocol event pipeline, store, and scheduler daemon.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use quietd::config::Config;
use quietd::server::Server;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("quietd=info".parse().unwrap()))
        .init();

    let config = Config::parse();
    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!("quietd v{} - quiet protocol daemon", env!("CARGO_PKG_VERSION"));

    match Server::new(config) {
        Ok(server) => {
            let server = Arc::new(server);
            let signal_server = server.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("received shutdown signal");
                signal_server.shutdown();
            });

            if let Err(e) = server.run().await {
                error!("server error: {e}");
                return ExitCode::FAILURE;
            }
        }
        Err(e) => {
            error!("failed to initialize server: {e}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
