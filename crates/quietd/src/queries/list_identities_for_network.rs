//! Grounded on `original_source/protocols/quiet/events/identity/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct ListIdentitiesForNetwork;

impl Query for ListIdentitiesForNetwork {
    fn name(&self) -> &'static str {
        "list_identities_for_network"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let network_id = required_str(&params, "network_id")?;
        to_json(&store.list_identities_for_network(&network_id)?)
    }
}
