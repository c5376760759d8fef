//! The envelope pipeline: context, handler registry, runner, and the
//! concrete handlers (spec §4.3).

pub mod ctx;
pub mod handlers;
pub mod registry;
pub mod runner;

use std::collections::HashMap;

use quiet_core::{CryptoMode, Envelope};

use crate::error::Result;
use crate::store::Store;

pub use ctx::{OutboundSend, PipelineCtx, SyncCacheEntry};
pub use registry::{Handler, HandlerRegistry};
pub use runner::Runner;

/// Owns the store, the standard handler registry, and the process-lifetime
/// in-memory sync-request cache. One `Pipeline` per running `quietd`
/// process; every request (command, incoming packet, scheduler tick) calls
/// [`Pipeline::drive`].
pub struct Pipeline {
    pub store: Store,
    registry: HandlerRegistry,
    crypto_mode: CryptoMode,
    sync_cache: std::sync::Mutex<HashMap<String, SyncCacheEntry>>,
    /// Datagrams queued by a pipeline pass, waiting for the server loop to
    /// drain them through the real `Transport` (ctx.rs: "handlers stay
    /// synchronous; the server loop drains the outbox after a pipeline
    /// pass completes"). A buffer rather than an immediate send because a
    /// pass can run outside the server loop's own iteration — a command
    /// or scheduler tick invoked directly (tests, a one-shot CLI call) has
    /// nowhere else to hand its outbox off to.
    pending_sends: std::sync::Mutex<Vec<OutboundSend>>,
}

impl Pipeline {
    pub fn new(store: Store, crypto_mode: CryptoMode) -> Self {
        Self {
            store,
            registry: HandlerRegistry::standard(),
            crypto_mode,
            sync_cache: std::sync::Mutex::new(HashMap::new()),
            pending_sends: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Run `seed` to quiescence inside one write lease, returning the
    /// terminal envelopes plus whatever the handlers queued for send.
    pub fn crypto_mode(&self) -> CryptoMode {
        self.crypto_mode
    }

    pub fn drive(&self, seed: Vec<Envelope>, now_ms: i64) -> Result<(Vec<Envelope>, Vec<OutboundSend>)> {
        self.store.write_txn(|write| {
            let mut cache = self.sync_cache.lock().expect("sync cache mutex poisoned");
            let mut ctx = PipelineCtx {
                store: write,
                crypto_mode: self.crypto_mode,
                now_ms,
                outbox: Vec::new(),
                sync_cache: &mut cache,
            };
            let runner = Runner::new(&self.registry);
            let terminal = runner.drive(seed, &mut ctx);
            Ok((terminal, ctx.outbox))
        })
    }

    /// Like [`Self::drive`], but queues the resulting outbox on
    /// `pending_sends` instead of handing it back to the caller. Used by
    /// `api::Api` and `scheduler::Scheduler`, neither of which holds a
    /// `Transport` of its own.
    pub fn drive_and_queue(&self, seed: Vec<Envelope>, now_ms: i64) -> Result<Vec<Envelope>> {
        let (terminal, outbox) = self.drive(seed, now_ms)?;
        self.pending_sends.lock().expect("pending sends mutex poisoned").extend(outbox);
        Ok(terminal)
    }

    /// Drain every datagram queued since the last drain (server loop, once
    /// per iteration, after processing both inbound datagrams and a
    /// scheduler tick).
    pub fn take_pending_sends(&self) -> Vec<OutboundSend> {
        std::mem::take(&mut *self.pending_sends.lock().expect("pending sends mutex poisoned"))
    }
}
