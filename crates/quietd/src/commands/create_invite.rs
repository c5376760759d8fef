//! Grounded on `original_source/protocols/quiet/events/invite/commands.py`
//! (the mint side; `accept_invite` handles redemption).

use quiet_core::{crypto, CryptoMode, Envelope, EventBody, Error as CoreError};
use serde_json::Value;

use super::{optional_str, required_i64, required_str, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct CreateInvite;

impl Command for CreateInvite {
    fn name(&self) -> &'static str {
        "create_invite"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let network_id = required_str(&params, "network_id")?;
        let inviter_id = required_str(&params, "inviter_id")?;
        let expires_at = required_i64(&params, "expires_at")?;
        let target_user_id = optional_str(&params, "target_user_id");

        if expires_at <= now_ms {
            return Err(CoreError::InputMalformed("invite expires_at must be after created_at".to_string()).into());
        }

        // One of the few event types the projector keys by a body-declared
        // field rather than the event id (DESIGN.md "ignored body field"
        // note), so it has to be minted fresh here, the same way
        // `create_network` mints its own `network_id`.
        let invite_code = hex::encode(crypto::random_secret());

        let body = EventBody::Invite(quiet_core::event::InviteEvent {
            invite_code,
            network_id,
            inviter_id: inviter_id.clone(),
            created_at: now_ms,
            expires_at,
            target_user_id,
        });
        Ok(vec![self_created_envelope(&inviter_id, body)?])
    }
}
