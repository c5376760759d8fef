//! Grounded on `original_source/protocols/quiet/events/address/commands.py`.
//! Announces a new reachable address for a peer; network-directory
//! information rather than group content (DESIGN.md Open Question
//! Decision #6), so it rides the bootstrap encryption path like `user`.

use quiet_core::{CryptoMode, Envelope, EventBody};
use serde_json::Value;

use super::{required_str, required_u16, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct RegisterAddress;

impl Command for RegisterAddress {
    fn name(&self) -> &'static str {
        "register_address"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let peer_id = required_str(&params, "peer_id")?;
        let user_id = required_str(&params, "user_id")?;
        let network_id = required_str(&params, "network_id")?;
        let address = required_str(&params, "address")?;
        let port = required_u16(&params, "port")?;

        let body = EventBody::Address(quiet_core::event::AddressEvent {
            // Superseded by the event id at projection time, like `user_id`.
            address_id: String::new(),
            peer_id: peer_id.clone(),
            user_id,
            network_id,
            address,
            port,
            timestamp: now_ms,
        });
        Ok(vec![self_created_envelope(&peer_id, body)?])
    }
}
