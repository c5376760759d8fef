//! Grounded on `original_source/protocols/quiet/events/user/commands.py`.
//! Joins an *existing* local identity to a network as a user; pairing a
//! fresh identity with its first `user` event in one call is
//! `accept_invite`'s job, not this one's.

use quiet_core::{CryptoMode, Envelope, EventBody};
use serde_json::Value;

use super::{optional_str, required_str, required_u16, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct CreateUser;

impl Command for CreateUser {
    fn name(&self) -> &'static str {
        "create_user"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let peer_id = required_str(&params, "peer_id")?;
        let network_id = required_str(&params, "network_id")?;
        let address = required_str(&params, "address")?;
        let port = required_u16(&params, "port")?;
        let name = optional_str(&params, "name");

        let body = EventBody::User(quiet_core::event::UserEvent {
            // Superseded by the event id at projection time (DESIGN.md
            // "ignored body field" note) — never read back by anything.
            user_id: String::new(),
            peer_id: peer_id.clone(),
            network_id,
            name,
            address,
            port,
            created_at: now_ms,
        });
        Ok(vec![self_created_envelope(&peer_id, body)?])
    }
}
