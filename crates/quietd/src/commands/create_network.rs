//! Grounded on `original_source/protocols/quiet/events/network/commands.py`.
//! Mints a fresh identity and the network it creates in the same batch —
//! the identity's future event id (known before the pipeline ever runs, see
//! `commands::future_event_id`) becomes the network's `creator_id` and the
//! signer the dependent `network` envelope is built under.

use quiet_core::{crypto, CryptoMode, Envelope, EventBody};
use serde_json::Value;

use super::{build_identity_envelope, optional_str, required_str, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct CreateNetwork;

impl Command for CreateNetwork {
    fn name(&self) -> &'static str {
        "create_network"
    }

    fn run(&self, params: Value, _store: &ReadStore, mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let name = required_str(&params, "name")?;
        let description = optional_str(&params, "description").unwrap_or_default();
        let identity_name = optional_str(&params, "identity_name");

        // The network's own id: an opaque identifier the creator picks once
        // and every member references from the start, not a content hash of
        // anything (DESIGN.md "body field is the real id" note — `network`
        // is one of the few event types the projector keys by the body's
        // own field rather than by the event id).
        let network_id = hex::encode(crypto::random_secret());

        let identity = build_identity_envelope(&network_id, identity_name, None, mode, now_ms)?;

        let network_body = EventBody::Network(quiet_core::event::NetworkEvent {
            network_id: network_id.clone(),
            name,
            description,
            creator_id: identity.peer_id.clone(),
            created_at: now_ms,
        });
        let network_env = self_created_envelope(&identity.peer_id, network_body)?;

        Ok(vec![identity.envelope, network_env])
    }
}
