//! §4.3.11 Sync (probe) and reflect. Grounded on
//! `original_source/protocols/quiet/handlers/sync_request.py` and
//! `sync_response.py`.
//!
//! A probe has no durable `peer_transit_key` to ride on yet (that's often
//! the point of probing), so the request carries its own one-shot transit
//! secret. Both ends derive the same stand-in `transit_key_id` from that
//! secret, which is all `receive_from_network`/`decrypt_transit` need to
//! treat a reflected response like any other inbound datagram.

use quiet_core::{crypto, Envelope, EventBody, EventPlaintext};

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

/// A `transit_key_id` stand-in derived from an ephemeral probe secret
/// rather than looked up from `transit_keys` — both the requester (who
/// generates the secret) and the responder (who reads it back off the
/// decrypted request) compute the same id from the same bytes.
pub(crate) fn ephemeral_transit_key_id(secret: &[u8; 32]) -> String {
    hex::encode(crypto::blake2b(secret, 32))
}

pub struct SyncRequestHandler;

impl Handler for SyncRequestHandler {
    fn name(&self) -> &'static str {
        "sync_request"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.error.is_none()
            && env.event_type.as_deref() == Some("sync_request")
            && env.flags.validated
            && !env.flags.self_created
    }

    fn process(&self, env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let Some(value) = env.event_plaintext.clone() else { return Ok(vec![]) };
        let Ok(plaintext) = serde_json::from_value::<EventPlaintext>(value) else { return Ok(vec![]) };
        let EventBody::SyncRequest(req) = plaintext.body else { return Ok(vec![]) };

        let (Some(dest_ip), Some(dest_port)) = (env.origin_ip.clone(), env.origin_port) else {
            // No return address on the datagram that carried this probe;
            // nothing to reply to.
            return Ok(vec![]);
        };
        let Some(secret) = req
            .transit_secret
            .as_deref()
            .and_then(|s| hex::decode(s).ok())
            .and_then(|b| <[u8; 32]>::try_from(b).ok())
        else {
            return Ok(vec![]);
        };
        let transit_key_id = ephemeral_transit_key_id(&secret);

        let rows = ctx.store.recent_events_for_network(&req.network_id, 200)?;
        let mut out = Vec::new();
        for row in rows {
            // Key-distribution events are sealed to one specific recipient
            // peer; reflecting them to an arbitrary prober would hand out
            // secret material to whoever asks. Everything else reflected
            // here is either already group-key encrypted or (bootstrap
            // identity/network events) was never secret to begin with.
            if row.event_type == "key" {
                continue;
            }
            let key_kind = row.event_key_id.as_ref().map(|_| "key");
            let inner = serde_json::json!({
                "event_key_id": row.event_key_id,
                "key_kind": key_kind,
                "event_ciphertext": hex::encode(&row.event_ciphertext),
                "in_response_to": req.request_id,
            });
            let Ok(inner_bytes) = serde_json::to_vec(&inner) else { continue };
            let Ok(transit_ciphertext) = crypto::aead_encrypt(ctx.crypto_mode, &inner_bytes, &secret) else {
                continue;
            };

            let mut resp = Envelope::new();
            resp.transit_key_id = Some(transit_key_id.clone());
            resp.transit_ciphertext = Some(transit_ciphertext);
            resp.dest_ip = Some(dest_ip.clone());
            resp.dest_port = Some(dest_port);
            resp.flags.stripped_for_send = true;
            out.push(resp);
        }
        Ok(out)
    }
}

pub struct SyncResponseHandler;

impl Handler for SyncResponseHandler {
    fn name(&self) -> &'static str {
        "sync_response"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.in_response_to.is_some() && env.event_ciphertext.is_some() && !env.flags.self_created
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let request_id = env.in_response_to.clone().unwrap_or_default();
        // No cache hit means either this reply is unsolicited or its 30s
        // window already lapsed; either way there's nothing to correlate it
        // against, so it's discarded rather than trusted blind.
        if ctx.take_cached_sync_request(&request_id).is_none() {
            return Ok(vec![]);
        }

        let event_id = env.event_id.clone().unwrap_or_default();
        if ctx.store.has_event(&event_id)? {
            return Ok(vec![]);
        }

        env.in_response_to = None;
        Ok(vec![env])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventRow, Store};

    fn ctx_with<'a>(
        store: &'a crate::store::WriteStore,
        cache: &'a mut std::collections::HashMap<String, crate::pipeline::ctx::SyncCacheEntry>,
    ) -> PipelineCtx<'a> {
        PipelineCtx { store, crypto_mode: quiet_core::CryptoMode::Dummy, now_ms: 0, outbox: vec![], sync_cache: cache }
    }

    fn sample_row(event_id: &str) -> EventRow {
        EventRow {
            event_id: event_id.into(),
            event_type: "message".into(),
            event_ciphertext: vec![9, 9, 9],
            event_key_id: Some("g1".into()),
            received_at: 0,
            origin_ip: None,
            origin_port: None,
            stored_at: 0,
            purged: false,
            purged_at: None,
            purged_reason: None,
            ttl_expire_at: None,
            validated: true,
        }
    }

    #[test]
    fn sync_request_reflects_stored_events_and_excludes_key_events() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.put_event(&sample_row("ev1"))?;
                w.put_event(&EventRow { event_type: "key".into(), ..sample_row("ev2") })
            })
            .unwrap();

        let secret = [7u8; 32];
        let plaintext = EventPlaintext::new(EventBody::SyncRequest(quiet_core::event::SyncRequestEvent {
            request_id: "req1".into(),
            network_id: "n1".into(),
            peer_id: "requester".into(),
            user_id: None,
            transit_secret: Some(hex::encode(secret)),
            timestamp_ms: 1,
            target_peer_id: None,
        }));

        let mut env = Envelope::new();
        env.event_type = Some("sync_request".into());
        env.flags.validated = true;
        env.origin_ip = Some("10.0.0.2".into());
        env.origin_port = Some(5000);
        env.event_plaintext = Some(serde_json::to_value(&plaintext).unwrap());

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                SyncRequestHandler.process(env, &mut ctx)
            })
            .unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].flags.stripped_for_send);
        assert_eq!(out[0].transit_key_id.as_deref(), Some(ephemeral_transit_key_id(&secret).as_str()));
        assert_eq!(out[0].dest_ip.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn sync_response_without_cached_request_is_discarded() {
        let store = Store::open_in_memory().unwrap();
        let mut env = Envelope::new();
        env.in_response_to = Some("unknown-request".into());
        env.event_ciphertext = Some(vec![1, 2, 3]);
        env.event_id = Some("ev1".into());

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                SyncResponseHandler.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn sync_response_with_cached_request_strips_correlation_and_continues() {
        let store = Store::open_in_memory().unwrap();
        let mut env = Envelope::new();
        env.in_response_to = Some("req1".into());
        env.event_ciphertext = Some(vec![1, 2, 3]);
        env.event_id = Some("ev1".into());

        let mut cache = std::collections::HashMap::new();
        cache.insert(
            "req1".into(),
            crate::pipeline::ctx::SyncCacheEntry {
                transit_secret: hex::encode([7u8; 32]),
                network_id: "n1".into(),
                expires_at_ms: 30_000,
            },
        );
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                SyncResponseHandler.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].in_response_to.is_none());
    }

    #[test]
    fn sync_response_deduped_against_existing_event() {
        let store = Store::open_in_memory().unwrap();
        store.write_txn(|w| w.put_event(&sample_row("ev1"))).unwrap();

        let mut env = Envelope::new();
        env.in_response_to = Some("req1".into());
        env.event_ciphertext = Some(vec![1, 2, 3]);
        env.event_id = Some("ev1".into());

        let mut cache = std::collections::HashMap::new();
        cache.insert(
            "req1".into(),
            crate::pipeline::ctx::SyncCacheEntry {
                transit_secret: hex::encode([7u8; 32]),
                network_id: "n1".into(),
                expires_at_ms: 30_000,
            },
        );
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                SyncResponseHandler.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }
}
