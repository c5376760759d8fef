//! §4.3.7 (pipeline position) membership check. Grounded on
//! `original_source/protocols/quiet/handlers/membership_check.py`, whose
//! original body is a stub ("TODO: Implement actual group membership
//! validation") that always approves — SPEC_FULL promotes this to a real
//! check against the projected `group_members` table, since a complete
//! implementation of the system needs one even though the PoC didn't have
//! it yet.

use quiet_core::Envelope;

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

pub struct MembershipCheck;

impl Handler for MembershipCheck {
    fn name(&self) -> &'static str {
        "membership_check"
    }

    fn filter(&self, env: &Envelope) -> bool {
        !env.flags.is_group_member
            && env.flags.sig_checked
            && env.event_type.is_some()
            && env.event_plaintext.is_some()
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let event_type = env.event_type.clone().unwrap_or_default();

        // Only group-scoped event types are gated; everything else (e.g.
        // identity, network, invite, key) has no group to be a member of.
        if !matches!(event_type.as_str(), "channel" | "message") {
            env.flags.is_group_member = true;
            return Ok(vec![env]);
        }

        // Self-created envelopes were authored by us; a node always trusts
        // its own write, and a group's creator is implicitly a member of
        // groups they themselves are creating before any `InsertGroupMember`
        // delta has landed.
        if env.flags.self_created {
            env.flags.is_group_member = true;
            return Ok(vec![env]);
        }

        let Some(plaintext) = &env.event_plaintext else { return Ok(vec![env]) };
        let Some(group_id) = plaintext.get("group_id").and_then(|v| v.as_str()) else {
            env.error = Some(format!("{event_type} event missing group_id"));
            return Ok(vec![]);
        };

        if let Some(group) = ctx.store.get_group(group_id)? {
            if group.creator_id == env.peer_id.clone().unwrap_or_default() {
                env.flags.is_group_member = true;
                return Ok(vec![env]);
            }
        }

        let Some(peer_id) = &env.peer_id else {
            env.flags.is_group_member = false;
            return Ok(vec![]);
        };
        let Some(user) = ctx.store.get_user_by_peer_id(peer_id)? else {
            // We don't yet know this peer as a user of the network at all —
            // block rather than reject outright, since the user event may
            // simply not have arrived yet.
            let dep = format!("peer:{peer_id}");
            if !env.deps.contains(&dep) {
                env.deps.push(dep.clone());
            }
            env.flags.missing_deps = true;
            env.missing_dep_list = vec![dep];
            env.flags.deps_included_and_valid = false;
            return Ok(vec![env]);
        };

        if ctx.store.is_group_member(group_id, &user.user_id)? {
            env.flags.is_group_member = true;
            Ok(vec![env])
        } else {
            env.error = Some(format!("{} is not a member of {group_id}", user.user_id));
            Ok(vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use quiet_core::delta::{GroupMemberRow, GroupRow, UserRow};

    fn ctx_with<'a>(
        store: &'a crate::store::WriteStore,
        cache: &'a mut std::collections::HashMap<String, crate::pipeline::ctx::SyncCacheEntry>,
    ) -> PipelineCtx<'a> {
        PipelineCtx { store, crypto_mode: quiet_core::CryptoMode::Dummy, now_ms: 0, outbox: vec![], sync_cache: cache }
    }

    fn seed(store: &Store) {
        store
            .write_txn(|w| {
                w.apply_deltas(&[
                    quiet_core::Delta::InsertGroup(GroupRow {
                        group_id: "g1".into(),
                        network_id: "n1".into(),
                        name: "grp".into(),
                        creator_id: "u0".into(),
                        owner_id: "u0".into(),
                        created_at: 0,
                        permissions_json: "{}".into(),
                    }),
                    quiet_core::Delta::InsertUser(UserRow {
                        user_id: "u1".into(),
                        peer_id: "p1".into(),
                        network_id: "n1".into(),
                        name: None,
                        joined_at: 0,
                        last_address: None,
                        last_port: None,
                    }),
                    quiet_core::Delta::InsertGroupMember(GroupMemberRow {
                        group_id: "g1".into(),
                        user_id: "u1".into(),
                        added_by: "u0".into(),
                        added_at: 0,
                    }),
                ])
            })
            .unwrap();
    }

    #[test]
    fn member_passes() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let mut env = Envelope::new();
        env.flags.sig_checked = true;
        env.peer_id = Some("p1".into());
        env.event_type = Some("message".into());
        env.event_plaintext = Some(serde_json::json!({"group_id": "g1"}));

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                MembershipCheck.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].flags.is_group_member);
    }

    #[test]
    fn non_member_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let mut env = Envelope::new();
        env.flags.sig_checked = true;
        env.peer_id = Some("p-stranger".into());
        env.event_type = Some("message".into());
        env.event_plaintext = Some(serde_json::json!({"group_id": "g1"}));

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                MembershipCheck.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn non_group_scoped_type_is_exempt() {
        let store = Store::open_in_memory().unwrap();
        let mut env = Envelope::new();
        env.flags.sig_checked = true;
        env.event_type = Some("address".into());
        env.event_plaintext = Some(serde_json::json!({}));

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                MembershipCheck.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].flags.is_group_member);
    }
}
