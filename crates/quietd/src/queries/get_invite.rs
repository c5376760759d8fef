//! Grounded on `original_source/protocols/quiet/events/invite/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct GetInvite;

impl Query for GetInvite {
    fn name(&self) -> &'static str {
        "get_invite"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let invite_code = required_str(&params, "invite_code")?;
        to_json(&store.get_invite(&invite_code)?)
    }
}
