//! Process configuration. Grounded on `gossipd::config::Config`'s shape
//! (a `clap::Parser` struct, a `validate` method) with the fields spec §6
//! actually names: listen address, store path (defaulting to an
//! in-memory store), and `CRYPTO_MODE`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use quiet_core::CryptoMode;

/// quietd - the quiet protocol's event pipeline, store, and scheduler daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "quietd")]
#[command(about = "Event pipeline, store, and scheduler daemon for the quiet protocol")]
pub struct Config {
    /// UDP listen address for the transport (spec §6 Transport).
    #[arg(short, long, default_value = "0.0.0.0:7654")]
    pub listen: SocketAddr,

    /// Data directory for the sled store. When absent, an in-memory,
    /// non-persistent store is used (`Store::open_in_memory`, matching
    /// spec §6 "store path CLI flag defaulting to an in-memory store").
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Real AEAD/signing vs. deterministic dummy crypto, for tests and
    /// load tooling that don't want real key generation on the hot path.
    #[arg(long, env = "CRYPTO_MODE", default_value = "real")]
    pub crypto_mode: CryptoMode,

    /// Scheduler tick interval, in milliseconds.
    #[arg(long, default_value = "1000")]
    pub tick_interval_ms: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty).
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be non-zero");
        }
        Ok(())
    }
}
