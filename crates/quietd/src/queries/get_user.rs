//! Grounded on `original_source/protocols/quiet/events/user/queries.py`.

use serde_json::Value;

use super::{required_str, to_json, Query};
use crate::error::Result;
use crate::store::ReadStore;

pub struct GetUser;

impl Query for GetUser {
    fn name(&self) -> &'static str {
        "get_user"
    }

    fn run(&self, params: Value, store: &ReadStore) -> Result<Value> {
        let user_id = required_str(&params, "user_id")?;
        to_json(&store.get_user(&user_id)?)
    }
}
