//! Grounded on `original_source/protocols/quiet/events/identity/commands.py`.

use quiet_core::{CryptoMode, Envelope};
use serde_json::Value;

use super::{build_identity_envelope, optional_str, required_str, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct CreateIdentity;

impl Command for CreateIdentity {
    fn name(&self) -> &'static str {
        "create_identity"
    }

    fn run(&self, params: Value, _store: &ReadStore, mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let network_id = required_str(&params, "network_id")?;
        let name = optional_str(&params, "name");
        let invite_code = optional_str(&params, "invite_code");

        let identity = build_identity_envelope(&network_id, name, invite_code, mode, now_ms)?;
        Ok(vec![identity.envelope])
    }
}
