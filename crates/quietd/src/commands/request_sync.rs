//! Grounded on `original_source/protocols/quiet/handlers/sync_request.py`'s
//! request-construction side (the response side lives in
//! `pipeline::handlers::sync`). Unlike every other command, this one
//! targets a raw address directly and sets `env.flags.outgoing` itself —
//! every other command produces passive gossip that only leaves the node
//! once some other peer's probe pulls it (DESIGN.md Open Question
//! Decision #7).

use quiet_core::{crypto, CryptoMode, Envelope, EventBody};
use serde_json::Value;

use super::{optional_str, required_str, required_u16, self_created_envelope, Command};
use crate::error::Result;
use crate::pipeline::handlers::sync::ephemeral_transit_key_id;
use crate::store::ReadStore;

pub struct RequestSync;

impl Command for RequestSync {
    fn name(&self) -> &'static str {
        "request_sync"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let peer_id = required_str(&params, "peer_id")?;
        let network_id = required_str(&params, "network_id")?;
        let dest_ip = required_str(&params, "dest_ip")?;
        let dest_port = required_u16(&params, "dest_port")?;
        let user_id = optional_str(&params, "user_id");
        let target_peer_id = optional_str(&params, "target_peer_id");

        let secret = crypto::random_secret();
        let transit_key_id = ephemeral_transit_key_id(&secret);
        let request_id = hex::encode(crypto::random_secret());

        let body = EventBody::SyncRequest(quiet_core::event::SyncRequestEvent {
            request_id,
            network_id,
            peer_id: peer_id.clone(),
            user_id,
            transit_secret: Some(hex::encode(secret)),
            timestamp_ms: now_ms,
            target_peer_id,
        });

        let mut env = self_created_envelope(&peer_id, body)?;
        env.transit_key_id = Some(transit_key_id);
        env.dest_ip = Some(dest_ip);
        env.dest_port = Some(dest_port);
        env.flags.outgoing = true;

        Ok(vec![env])
    }
}
