//! Grounded on `original_source/protocols/quiet/events/channel/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct GetChannel;

impl Query for GetChannel {
    fn name(&self) -> &'static str {
        "get_channel"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let channel_id = required_str(&params, "channel_id")?;
        to_json(&store.get_channel(&channel_id)?)
    }
}
