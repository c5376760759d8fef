//! Grounded on `original_source/protocols/quiet/events/message/commands.py`.

use quiet_core::{CryptoMode, Envelope, EventBody, Error as CoreError};
use serde_json::Value;

use super::{required_str, self_created_envelope, Command};
use crate::error::Result;
use crate::store::ReadStore;

pub struct CreateMessage;

impl Command for CreateMessage {
    fn name(&self) -> &'static str {
        "create_message"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let channel_id = required_str(&params, "channel_id")?;
        let group_id = required_str(&params, "group_id")?;
        let network_id = required_str(&params, "network_id")?;
        let peer_id = required_str(&params, "peer_id")?;
        let content = required_str(&params, "content")?;

        if content.is_empty() || content.chars().count() > 10_000 {
            return Err(CoreError::InputMalformed("message content must be 1..=10000 characters".to_string()).into());
        }

        let body = EventBody::Message(quiet_core::event::MessageEvent {
            channel_id,
            group_id: group_id.clone(),
            network_id,
            peer_id: peer_id.clone(),
            content,
            created_at: now_ms,
        });
        let mut env = self_created_envelope(&peer_id, body)?;
        env.group_id = Some(group_id);
        Ok(vec![env])
    }
}
