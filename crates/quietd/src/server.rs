//! quietd server - main service loop. Grounded on `gossipd::server::Server`'s
//! shape (a `Config`-constructed struct owning storage plus background
//! tasks, a broadcast shutdown channel, `run`/`shutdown`/`stats`), adapted
//! from `gossipd`'s TCP control-plane loop to the quiet protocol's UDP
//! datagram transport and pipeline-driven processing.

use std::time::Duration;

use quiet_core::Envelope;
use quiet_net::transport::{Transport, UdpTransport};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::Api;
use crate::config::Config;
use crate::error::Error as QuietdError;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(#[from] quiet_net::TransportError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] QuietdError),
}

/// Server state: one store, one pipeline, one scheduler, one transport.
pub struct Server {
    config: Config,
    api: Api,
    scheduler: Scheduler,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let store = match &config.data_dir {
            Some(dir) => Store::open(dir).map_err(QuietdError::Store)?,
            None => Store::open_in_memory().map_err(QuietdError::Store)?,
        };
        let pipeline = Pipeline::new(store, config.crypto_mode);
        let api = Api::new(pipeline);
        let scheduler = Scheduler::new();
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self { config, api, scheduler, shutdown_tx })
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Run the server: bind the UDP transport, then loop receiving
    /// datagrams, ticking the scheduler, and draining the outbox, until a
    /// shutdown signal arrives.
    pub async fn run(&self) -> Result<(), ServerError> {
        let transport = UdpTransport::bind(self.config.listen).await?;
        info!(addr = %self.config.listen, "quietd listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.on_tick(&transport).await {
                        error!(error = %e, "tick failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        self.api.pipeline.store.flush().map_err(QuietdError::Store)?;
        Ok(())
    }

    /// One iteration: drain inbound datagrams through the pipeline, run due
    /// scheduler jobs, then flush whatever either queued for send.
    async fn on_tick(&self, transport: &UdpTransport) -> Result<(), ServerError> {
        let now_ms = now_ms();

        let inbound = transport.receive().await?;
        for datagram in inbound {
            let mut env = Envelope::new();
            env.raw_data = Some(datagram.raw_data);
            env.origin_ip = Some(datagram.origin_ip);
            env.origin_port = Some(datagram.origin_port);
            env.received_at = datagram.received_at;
            if let Err(e) = self.api.pipeline.drive_and_queue(vec![env], now_ms) {
                warn!(error = %e, "inbound datagram pipeline pass failed");
            }
        }

        if let Err(e) = self.scheduler.tick(&self.api.pipeline, now_ms) {
            warn!(error = %e, "scheduler tick failed");
        }

        for send in self.api.pipeline.take_pending_sends() {
            if let Err(e) = transport.send(&send.dest_ip, send.dest_port, send.raw_data, send.due_ms).await {
                debug!(dest = %send.dest_ip, error = %e, "send failed");
            }
        }

        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            data_dir: None,
            crypto_mode: quiet_core::CryptoMode::Dummy,
            tick_interval_ms: 1000,
            verbose: false,
            log_format: "pretty".to_string(),
        }
    }

    #[test]
    fn server_construction_opens_an_in_memory_store() {
        let config = test_config();
        let server = Server::new(config).unwrap();
        let dump = server.api().execute_query("dump_database", serde_json::json!({})).unwrap();
        assert!(dump.is_object());
    }
}
