//! §4.3.2 Resolve dependencies (and, via [`unblock_waiters`], the unblock
//! half the spec also describes under §4.3.8 Project). Grounded on
//! `original_source/protocols/quiet/handlers/resolve_deps.py` /
//! `resolve_deps_handler.py`.

use quiet_core::Envelope;

use crate::deps::{resolve_one, MAX_RETRY};
use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;
use crate::store::{BlockedEvent, StoreError};

pub struct ResolveDeps;

impl Handler for ResolveDeps {
    fn name(&self) -> &'static str {
        "resolve_deps"
    }

    fn filter(&self, env: &Envelope) -> bool {
        !env.flags.deps_included_and_valid || env.flags.missing_deps
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let dep_refs = env.dep_refs()?;

        // A `deps: []` envelope (e.g. a self-created identity, which
        // self-signs) is vacuously satisfied — matches the original's
        // `resolve_dependencies`, which short-circuits before ever
        // touching the store.
        if dep_refs.is_empty() {
            env.flags.deps_included_and_valid = true;
            env.flags.missing_deps = false;
            return Ok(vec![env]);
        }

        let mut all_satisfied = true;
        let mut missing = Vec::new();
        let mut missing_ids = Vec::new();

        for dep in &dep_refs {
            match resolve_one(dep, ctx.store)? {
                Some(resolved) => {
                    env.resolved_deps.insert(dep.as_string(), resolved);
                }
                None => {
                    all_satisfied = false;
                    missing.push(dep.as_string());
                    missing_ids.push(dep.id.clone());
                }
            }
        }

        if all_satisfied {
            env.flags.deps_included_and_valid = true;
            env.flags.missing_deps = false;
            env.missing_dep_list.clear();
            return Ok(vec![env]);
        }

        env.flags.missing_deps = true;
        // Bare ids, not `dep.as_string()`: this is what `index_blocked_dep`
        // below keys on, and what `unblock_event`'s removal (here and in
        // `unblock_waiters`) has to match. `missing_deps_json` a few lines
        // down keeps the "kind:id" form — that one's diagnostic only.
        env.missing_dep_list = missing_ids.clone();

        if env.retry_count >= MAX_RETRY {
            // Retry bound exhausted (spec §8 invariant #4): leave the
            // dependency index entirely rather than block forever.
            if let Some(event_id) = &env.event_id {
                ctx.store.unblock_event(event_id, &missing_ids)?;
            }
            return Ok(vec![]);
        }

        let event_id = env.event_id.clone().unwrap_or_else(|| {
            // Envelopes blocked before an event_id is known (e.g. still
            // transit-ciphertext shaped) are keyed by their transit key id so
            // they remain addressable.
            env.transit_key_id.clone().unwrap_or_default()
        });
        let blob = postcard::to_allocvec(&env).map_err(StoreError::Decode)?;
        ctx.store.block_event(&BlockedEvent {
            event_id: event_id.clone(),
            envelope_blob: blob,
            created_at: ctx.now_ms,
            missing_deps_json: serde_json::to_string(&missing).unwrap_or_default(),
            retry_count: env.retry_count,
        })?;
        for dep_id in &missing_ids {
            ctx.store.index_blocked_dep(&event_id, dep_id)?;
        }
        Ok(vec![])
    }
}

/// Called from the Project handler after a commit (spec §4.3.8): fetch
/// waiters keyed by the newly validated `event_id`, and for any whose full
/// dependency set is now satisfied, unblock and re-emit them.
pub fn unblock_waiters(store: &crate::store::WriteStore, event_id: &str) -> Result<Vec<Envelope>> {
    let mut out = Vec::new();
    for waiter_id in store.waiters_for_dep(event_id)? {
        let Some(blocked) = store.get_blocked(&waiter_id)? else { continue };
        let Ok(mut waiting_env) = postcard::from_bytes::<Envelope>(&blocked.envelope_blob) else {
            continue;
        };

        let dep_refs = match waiting_env.dep_refs() {
            Ok(refs) => refs,
            Err(_) => continue,
        };
        let all_ready = dep_refs.iter().all(|d| resolve_one(d, store).ok().flatten().is_some());
        if !all_ready {
            continue;
        }

        store.unblock_event(&waiter_id, &waiting_env.missing_dep_list)?;
        waiting_env.retry_count += 1;
        waiting_env.flags.unblocked = true;
        waiting_env.flags.deps_included_and_valid = false;
        waiting_env.flags.missing_deps = false;
        out.push(waiting_env);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, TransitKeyRow};

    fn ctx_with<'a>(
        store: &'a crate::store::WriteStore,
        cache: &'a mut std::collections::HashMap<String, crate::pipeline::ctx::SyncCacheEntry>,
    ) -> PipelineCtx<'a> {
        PipelineCtx { store, crypto_mode: quiet_core::CryptoMode::Dummy, now_ms: 1_000, outbox: vec![], sync_cache: cache }
    }

    #[test]
    fn unresolved_dep_blocks_and_indexes() {
        let store = Store::open_in_memory().unwrap();
        let mut env = Envelope::new();
        env.event_id = Some("ev1".into());
        env.deps = vec!["transit_key:missing".into()];

        let mut cache = std::collections::HashMap::new();
        store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                let out = ResolveDeps.process(env, &mut ctx)?;
                assert!(out.is_empty());
                Ok::<_, crate::error::Error>(())
            })
            .unwrap();

        assert_eq!(store.read().waiters_for_dep("missing").unwrap(), vec!["ev1".to_string()]);
    }

    #[test]
    fn resolved_dep_marks_valid_and_passes_through() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.put_transit_key(&TransitKeyRow {
                    transit_key_id: "tk1".into(),
                    transit_secret: [7; 32],
                    network_id: "n1".into(),
                })
            })
            .unwrap();

        let mut env = Envelope::new();
        env.event_id = Some("ev2".into());
        env.deps = vec!["transit_key:tk1".into()];

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                ResolveDeps.process(env, &mut ctx)
            })
            .unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].flags.deps_included_and_valid);
        assert!(out[0].resolved_deps.contains_key("transit_key:tk1"));
    }
}
