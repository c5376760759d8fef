//! The context threaded through every handler call — the `CoreContext`
//! design-note applied concretely: store, crypto mode, clock, and the
//! runner's outbox are passed explicitly rather than held in globals.

use std::collections::HashMap;

use quiet_core::CryptoMode;

use crate::store::WriteStore;

/// A datagram a handler wants sent. Handlers stay synchronous; the server
/// loop drains `ctx.outbox` through the real `Transport` after a pipeline
/// pass completes (spec §5: "the only genuine waits are ... transport I/O
/// in send-to-network").
#[derive(Clone, Debug)]
pub struct OutboundSend {
    pub dest_ip: String,
    pub dest_port: u16,
    pub raw_data: Vec<u8>,
    pub due_ms: Option<i64>,
}

/// A cached transit secret for an in-flight sync probe, keyed by
/// `request_id` (spec §4.3.11). 30-second TTL, in-memory only — grounded on
/// `original_source/protocols/quiet/handlers/sync_request.py`'s module-level
/// `TRANSIT_SECRET_CACHE` dict.
#[derive(Clone, Debug)]
pub struct SyncCacheEntry {
    pub transit_secret: String,
    pub network_id: String,
    pub expires_at_ms: i64,
}

pub struct PipelineCtx<'a> {
    pub store: &'a WriteStore,
    pub crypto_mode: CryptoMode,
    pub now_ms: i64,
    pub outbox: Vec<OutboundSend>,
    pub sync_cache: &'a mut HashMap<String, SyncCacheEntry>,
}

impl<'a> PipelineCtx<'a> {
    pub fn enqueue_send(&mut self, dest_ip: impl Into<String>, dest_port: u16, raw_data: Vec<u8>, due_ms: Option<i64>) {
        self.outbox.push(OutboundSend { dest_ip: dest_ip.into(), dest_port, raw_data, due_ms });
    }

    pub fn cache_sync_request(&mut self, request_id: String, transit_secret: String, network_id: String) {
        self.sync_cache.insert(
            request_id,
            SyncCacheEntry { transit_secret, network_id, expires_at_ms: self.now_ms + 30_000 },
        );
    }

    pub fn take_cached_sync_request(&mut self, request_id: &str) -> Option<SyncCacheEntry> {
        let entry = self.sync_cache.remove(request_id)?;
        if entry.expires_at_ms < self.now_ms {
            None
        } else {
            Some(entry)
        }
    }
}
