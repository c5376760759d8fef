//! Grounded on `original_source/protocols/quiet/events/channel/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct ListChannelsForGroup;

impl Query for ListChannelsForGroup {
    fn name(&self) -> &'static str {
        "list_channels_for_group"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let group_id = required_str(&params, "group_id")?;
        to_json(&store.list_channels_for_group(&group_id)?)
    }
}
