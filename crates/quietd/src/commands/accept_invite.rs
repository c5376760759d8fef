//! Grounded on `original_source/protocols/quiet/events/invite/commands.py`
//! (the accept/redeem side). Mints a fresh identity and its first `user`
//! event together, the same multi-envelope shape `create_network` uses —
//! the identity's future event id becomes the dependent `user` event's
//! signer.

use quiet_core::{CryptoMode, Envelope, EventBody, Error as CoreError};
use serde_json::Value;

use super::{build_identity_envelope, optional_str, required_str, required_u16, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct AcceptInvite;

impl Command for AcceptInvite {
    fn name(&self) -> &'static str {
        "accept_invite"
    }

    fn run(&self, params: Value, store: &ReadStore, mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let invite_code = required_str(&params, "invite_code")?;
        let address = required_str(&params, "address")?;
        let port = required_u16(&params, "port")?;
        let name = optional_str(&params, "name");
        let identity_name = optional_str(&params, "identity_name");

        let Some(invite) = store.get_invite(&invite_code)? else {
            return Err(CoreError::InputMalformed(format!("unknown invite code: {invite_code}")).into());
        };
        if invite.expires_at <= now_ms {
            return Err(CoreError::InputMalformed(format!("invite {invite_code} has expired")).into());
        }

        let identity = build_identity_envelope(&invite.network_id, identity_name, Some(invite_code), mode, now_ms)?;

        let user_body = EventBody::User(quiet_core::event::UserEvent {
            user_id: String::new(),
            peer_id: identity.peer_id.clone(),
            network_id: invite.network_id,
            name,
            address,
            port,
            created_at: now_ms,
        });
        let user_env = self_created_envelope(&identity.peer_id, user_body)?;

        Ok(vec![identity.envelope, user_env])
    }
}
