//! Dependency resolution (spec §4.3.2), grounded on
//! `original_source/protocols/quiet/handlers/resolve_deps.py`.

use quiet_core::{DepRef, ResolvedDep};

use crate::store::{ReadStore, StoreError};

/// Hard retry cap (spec §4.3.2, §5, §8 invariant #4): past this, a blocked
/// envelope leaves the dependency index entirely rather than blocking forever.
pub const MAX_RETRY: u32 = 100;

/// Resolve one `"kind:id"` reference against the store. Returns `None` when
/// the dependency isn't satisfiable yet (missing, unvalidated, or purged) —
/// never an error, since "not yet satisfied" is the expected, common case.
pub fn resolve_one(dep: &DepRef, store: &ReadStore) -> Result<Option<ResolvedDep>, StoreError> {
    match dep.kind.as_str() {
        "transit_key" => Ok(store
            .get_transit_key(&dep.id)?
            .map(|row| ResolvedDep::TransitKey { transit_key_id: row.transit_key_id })),

        "identity" | "peer" => {
            if !store.is_validated_and_unpurged(&dep.id)? {
                return Ok(None);
            }
            let Some(row) = store.get_event(&dep.id)? else { return Ok(None) };
            let plaintext: serde_json::Value = serde_json::from_slice(&row.event_ciphertext).unwrap_or_default();
            let private_key = store.get_signing_key(&dep.id)?.map(|k| k.private_key);
            Ok(Some(ResolvedDep::Event { event_id: dep.id.clone(), plaintext, private_key }))
        }

        "key" => {
            // A `key:` dep ref's id is the target `group_id`, not the key
            // event's own id — the secret is looked up by the group it
            // unlocks (see `UnsealedKeyRow`), since that's how encrypt/decrypt
            // need to address it, and a group has one active key at a time.
            match store.get_unsealed_key(&dep.id)? {
                Some(row) => Ok(Some(ResolvedDep::UnsealedKey { key_id: dep.id.clone(), secret: row.secret })),
                None => Ok(None),
            }
        }

        _ => {
            if !store.is_validated_and_unpurged(&dep.id)? {
                return Ok(None);
            }
            let Some(row) = store.get_event(&dep.id)? else { return Ok(None) };
            let plaintext: serde_json::Value = serde_json::from_slice(&row.event_ciphertext).unwrap_or_default();
            Ok(Some(ResolvedDep::Event { event_id: dep.id.clone(), plaintext, private_key: None }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn unresolved_transit_key_is_none() {
        let store = Store::open_in_memory().unwrap();
        let dep = DepRef::new("transit_key", "nope");
        assert!(resolve_one(&dep, &store.read()).unwrap().is_none());
    }

    #[test]
    fn resolved_transit_key_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.put_transit_key(&crate::store::TransitKeyRow {
                    transit_key_id: "tk1".into(),
                    transit_secret: [1; 32],
                    network_id: "n1".into(),
                })
            })
            .unwrap();
        let dep = DepRef::new("transit_key", "tk1");
        let resolved = resolve_one(&dep, &store.read()).unwrap().unwrap();
        assert!(matches!(resolved, ResolvedDep::TransitKey { transit_key_id } if transit_key_id == "tk1"));
    }
}
