//! Grounded on `original_source/protocols/quiet/events/transit_secret/commands.py`.
//! Publishes a peer's `transit_key_id` so others can route to it; per
//! DESIGN.md Open Question Decision #8 the secret itself never rides the
//! gossiped body, only `local_metadata`, for `project` to persist locally.

use quiet_core::{crypto, CryptoMode, Envelope, EventBody, LocalMetadata};
use serde_json::Value;

use super::{required_str, self_created_envelope, Command};
use crate::error::Result;
use crate::pipeline::handlers::sync::ephemeral_transit_key_id;
use crate::store::ReadStore;

pub struct AnnounceTransitSecret;

impl Command for AnnounceTransitSecret {
    fn name(&self) -> &'static str {
        "announce_transit_secret"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let peer_id = required_str(&params, "peer_id")?;
        let network_id = required_str(&params, "network_id")?;

        let secret = crypto::random_secret();
        let transit_key_id = ephemeral_transit_key_id(&secret);

        let body = EventBody::TransitSecret(quiet_core::event::TransitSecretEvent {
            transit_key_id,
            peer_id: peer_id.clone(),
            network_id,
            created_at: now_ms,
        });
        let mut env = self_created_envelope(&peer_id, body)?;
        env.local_metadata = Some(LocalMetadata {
            transit_secret: Some(hex::encode(secret)),
            ..Default::default()
        });
        Ok(vec![env])
    }
}
