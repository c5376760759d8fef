//! Grounded on `original_source/protocols/quiet/events/group/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct GetGroup;

impl Query for GetGroup {
    fn name(&self) -> &'static str {
        "get_group"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let group_id = required_str(&params, "group_id")?;
        to_json(&store.get_group(&group_id)?)
    }
}
