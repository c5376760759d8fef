//! §4.3.3 Remove. Grounded on
//! `original_source/protocols/quiet/handlers/remove.py`: one handler, two
//! phases disambiguated by which fields are present when it fires. The
//! original's `deleted_events` table is our `events.purged` tombstone; the
//! type-specific remover's `{deleted_channels, removed_users,
//! deleted_messages}` context is reconstructed from current projected state
//! (a channel/member absent now implies "deleted"/"removed") rather than a
//! separate historical table, since the projector already drops those rows
//! outright on `DeleteChannel`/`RemoveGroupMember`. The original's
//! `filter_func` re-runs on anything where `should_remove is not False`
//! (Python's three-valued `None`/`True`/`False` lets "unset" and "kept"
//! stay distinct); `should_remove` here is a plain bool per §3, so
//! `remove_checked` carries that sentinel instead and `should_remove`
//! keeps its documented meaning, false on every envelope that passes.

use quiet_core::Envelope;

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

pub struct Remove;

impl Handler for Remove {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn filter(&self, env: &Envelope) -> bool {
        if env.flags.remove_checked {
            return false;
        }
        env.event_id.is_some() || (env.event_plaintext.is_some() && env.event_type.is_some())
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        if let Some(event_id) = &env.event_id {
            if ctx.store.is_tombstoned(event_id)? {
                return Ok(vec![]);
            }
        }

        if let (Some(plaintext), Some(event_type)) = (&env.event_plaintext, &env.event_type) {
            if should_remove_by_type(event_type, plaintext, ctx)? {
                return Ok(vec![]);
            }
        }

        env.flags.remove_checked = true;
        env.flags.should_remove = false;
        Ok(vec![env])
    }
}

fn should_remove_by_type(
    event_type: &str,
    plaintext: &serde_json::Value,
    ctx: &mut PipelineCtx,
) -> Result<bool> {
    match event_type {
        "message" => {
            let Some(channel_id) = plaintext.get("channel_id").and_then(|v| v.as_str()) else {
                return Ok(false);
            };
            // The channel was deleted (the projector drops its row outright) —
            // messages that arrive or are replayed into a gone channel are removed.
            Ok(ctx.store.get_channel(channel_id)?.is_none())
        }
        "channel" => {
            let (Some(group_id), Some(user_id)) = (
                plaintext.get("group_id").and_then(|v| v.as_str()),
                plaintext.get("user_id").and_then(|v| v.as_str()),
            ) else {
                return Ok(false);
            };
            Ok(!ctx.store.is_group_member(group_id, user_id)?)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use quiet_core::delta::ChannelRow;

    fn ctx_with<'a>(
        store: &'a crate::store::WriteStore,
        cache: &'a mut std::collections::HashMap<String, crate::pipeline::ctx::SyncCacheEntry>,
    ) -> PipelineCtx<'a> {
        PipelineCtx { store, crypto_mode: quiet_core::CryptoMode::Dummy, now_ms: 0, outbox: vec![], sync_cache: cache }
    }

    #[test]
    fn tombstoned_event_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        store.write_txn(|w| w.purge_event("ev1", "validation_failed")).unwrap();

        let mut env = Envelope::new();
        env.event_id = Some("ev1".into());

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                Remove.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn message_in_live_channel_passes_through() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.apply_deltas(&[quiet_core::Delta::InsertChannel(ChannelRow {
                    channel_id: "c1".into(),
                    group_id: "g1".into(),
                    network_id: "n1".into(),
                    name: "general".into(),
                    creator_id: "u1".into(),
                    created_at: 0,
                    description: None,
                })])
            })
            .unwrap();

        let mut env = Envelope::new();
        env.event_type = Some("message".into());
        env.event_plaintext = Some(serde_json::json!({ "channel_id": "c1" }));

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                Remove.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].flags.should_remove);
        assert!(out[0].flags.remove_checked);
    }

    #[test]
    fn message_in_deleted_channel_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        let mut env = Envelope::new();
        env.event_type = Some("message".into());
        env.event_plaintext = Some(serde_json::json!({ "channel_id": "gone" }));

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                Remove.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }
}
