//! Grounded on `original_source/protocols/quiet/events/identity/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct GetIdentity;

impl Query for GetIdentity {
    fn name(&self) -> &'static str {
        "get_identity"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let peer_id = required_str(&params, "peer_id")?;
        to_json(&store.get_identity(&peer_id)?)
    }
}
