//! Grounded on `original_source/protocols/quiet/events/message/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct ListMessagesForChannel;

impl Query for ListMessagesForChannel {
    fn name(&self) -> &'static str {
        "list_messages_for_channel"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let channel_id = required_str(&params, "channel_id")?;
        to_json(&store.list_messages_for_channel(&channel_id)?)
    }
}
