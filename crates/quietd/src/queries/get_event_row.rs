//! Debug/dump query over the raw, not-yet-decrypted `events` table row
//! (spec §6 "database dump" surface). Grounded on
//! `original_source/protocols/quiet/core/queries.py`'s debug inspection
//! helpers.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct GetEventRow;

impl Query for GetEventRow {
    fn name(&self) -> &'static str {
        "get_event_row"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let event_id = required_str(&params, "event_id")?;
        to_json(&store.get_event(&event_id)?)
    }
}
