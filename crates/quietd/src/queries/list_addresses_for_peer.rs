//! Grounded on `original_source/protocols/quiet/events/address/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct ListAddressesForPeer;

impl Query for ListAddressesForPeer {
    fn name(&self) -> &'static str {
        "list_addresses_for_peer"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let peer_id = required_str(&params, "peer_id")?;
        to_json(&store.list_addresses_for_peer(&peer_id)?)
    }
}
