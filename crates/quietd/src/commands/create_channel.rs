//! Grounded on `original_source/protocols/quiet/events/channel/commands.py`.
//! A channel is group content, not network-directory information (DESIGN.md
//! Open Question Decision #6), so unlike `group` itself it rides the
//! group-key encryption path — `env.group_id` has to be set on the envelope,
//! not just named in the body, for `event_crypto::encrypt` to find the key.

use quiet_core::{CryptoMode, Envelope, EventBody};
use serde_json::Value;

use super::{optional_str, required_str, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct CreateChannel;

impl Command for CreateChannel {
    fn name(&self) -> &'static str {
        "create_channel"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let group_id = required_str(&params, "group_id")?;
        let network_id = required_str(&params, "network_id")?;
        let creator_id = required_str(&params, "creator_id")?;
        let name = required_str(&params, "name")?;
        let description = optional_str(&params, "description");

        let body = EventBody::Channel(quiet_core::event::ChannelEvent {
            group_id: group_id.clone(),
            network_id,
            name,
            creator_id: creator_id.clone(),
            created_at: now_ms,
            description,
        });
        let mut env = self_created_envelope(&creator_id, body)?;
        env.group_id = Some(group_id);
        Ok(vec![env])
    }
}
