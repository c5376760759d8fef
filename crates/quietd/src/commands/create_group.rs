//! Grounded on `original_source/protocols/quiet/events/group/commands.py`.

use std::collections::BTreeMap;

use quiet_core::{CryptoMode, Envelope, EventBody};
use serde_json::Value;

use super::{required_str, self_created_envelope, Command};
use crate::error::{Error, Result};
use crate::store::ReadStore;

pub struct CreateGroup;

impl Command for CreateGroup {
    fn name(&self) -> &'static str {
        "create_group"
    }

    fn run(&self, params: Value, _store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let network_id = required_str(&params, "network_id")?;
        let creator_id = required_str(&params, "creator_id")?;
        let name = required_str(&params, "name")?;

        let mut permissions = BTreeMap::new();
        if let Some(obj) = params.get("permissions").and_then(|v| v.as_object()) {
            for (key, value) in obj {
                if !matches!(key.as_str(), "invite" | "remove" | "message") {
                    return Err(Error::Core(quiet_core::Error::InputMalformed(format!(
                        "unknown group permission key: {key}"
                    ))));
                }
                permissions.insert(key.clone(), value.as_bool().unwrap_or(false));
            }
        }

        let body = EventBody::Group(quiet_core::event::GroupEvent {
            // Superseded by the event id at projection time, like `user_id`.
            group_id: String::new(),
            name,
            network_id,
            creator_id: creator_id.clone(),
            created_at: now_ms,
            permissions,
        });
        Ok(vec![self_created_envelope(&creator_id, body)?])
    }
}
