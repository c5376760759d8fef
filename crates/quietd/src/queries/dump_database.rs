//! spec §6 "database dump" — every table, as a key/value-length summary
//! rather than decoded rows, since several tables hold encrypted or
//! postcard-only bytes that don't round-trip cleanly through JSON.
//! Grounded on `original_source/protocols/quiet/core/queries.py`'s
//! `dump_database` debug helper.

use serde_json::Value;

use super::Query;
use crate::error::Result;
use crate::store::ReadStore;

pub struct DumpDatabase;

impl Query for DumpDatabase {
    fn name(&self) -> &'static str {
        "dump_database"
    }

    fn run(&self, _params: Value, store: &ReadStore) -> Result<Value> {
        Ok(store.dump()?)
    }
}
