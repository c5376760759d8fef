//! §4.3.8 Project. Grounded on
//! `original_source/protocols/quiet/handlers/project.py` (dynamic
//! `{event_type: projector module}` dispatch plus its "store local metadata,
//! then check unblocks" sequencing), with the per-type
//! `original_source/protocols/quiet/events/*/projector.py` files for the
//! individual delta shapes. The dynamic `self.projectors` dict becomes a
//! `match` over `EventBody`; `DeltaApplicator.apply`'s per-op SQL becomes
//! `WriteStore::apply_deltas`.

use quiet_core::{Delta, EventBody, EventPlaintext, EventType};
use quiet_core::delta::{
    AddressRow, ChannelRow, GroupMemberRow, GroupRow, InviteRow, MessageRow, NetworkRow,
    PeerRow, PeerTransitKeyRow, UserRow,
};
use quiet_core::Envelope;

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;
use crate::pipeline::handlers::resolve_deps::unblock_waiters;
use crate::store::{SigningKeyRow, TransitKeyRow, UnsealedKeyRow};

pub struct Project;

impl Handler for Project {
    fn name(&self) -> &'static str {
        "project"
    }

    fn filter(&self, env: &Envelope) -> bool {
        // A self-created `sync_request` gets an `event_id` the same way any
        // other bootstrap-path event does (`event_crypto::encrypt` assigns
        // one to every bootstrap type uniformly), but it's a probe, not
        // group state — per its own doc comment it is never projected or
        // persisted. Left unexcluded, this handler's place ahead of
        // `check_outgoing` in registry order would eat the probe on its way
        // out, since `process` always drops the envelope it just projected.
        env.flags.validated
            && !env.flags.projected
            && env.event_id.is_some()
            && env.event_type.as_deref() != Some(EventType::SyncRequest.as_str())
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let event_id = env.event_id.clone().unwrap_or_default();

        let Some(value) = env.event_plaintext.clone() else {
            env.error = Some("no event_plaintext to project".to_string());
            return Ok(vec![]);
        };
        let plaintext: EventPlaintext = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => {
                env.error = Some(format!("plaintext malformed before projection: {e}"));
                return Ok(vec![]);
            }
        };

        // Self-created identities carry their freshly generated keypair in
        // `local_metadata`; persist it before anything else so a crash
        // between projection and the caller's next read can't lose it.
        if env.flags.self_created {
            if let (EventBody::Identity(_), Some(meta)) = (&plaintext.body, &env.local_metadata) {
                if let (Some(private_key), Some(seal_private_key)) =
                    (&meta.private_key, &meta.seal_private_key)
                {
                    ctx.store.put_signing_key(&SigningKeyRow {
                        peer_id: event_id.clone(),
                        private_key: private_key.clone(),
                        seal_private_key: seal_private_key.clone(),
                    })?;
                }
            }
            // A self-announced transit secret never appears in the gossiped
            // body (`TransitSecretEvent` only carries the `transit_key_id`
            // it hashes to — "sharing the key_id publicly, the actual
            // secret is kept local"); it rides in `local_metadata` instead,
            // exactly like a self-created identity's signing key above.
            if let (EventBody::TransitSecret(e), Some(meta)) = (&plaintext.body, &env.local_metadata) {
                if let Some(secret_hex) = &meta.transit_secret {
                    if let Ok(bytes) = hex::decode(secret_hex) {
                        if let Ok(secret) = <[u8; 32]>::try_from(bytes.as_slice()) {
                            ctx.store.put_transit_key(&TransitKeyRow {
                                transit_key_id: e.transit_key_id.clone(),
                                transit_secret: secret,
                                network_id: e.network_id.clone(),
                            })?;
                        }
                    }
                }
            }
        }

        // A `key` event authenticates by sealed-box rather than signature
        // (see `event_crypto::unseal`, which sets `env.unsealed_secret` and
        // `env.group_id` directly off the opened body) and is never run
        // through `project_body`/`apply_deltas` below — its row lives in
        // `unsealed_keys`, not any of the delta-projected tables. Persist it
        // here, for both a remote sender's key event and our own freshly
        // created one (`commands::create_key` sets `env.unsealed_secret`
        // itself so the creator holds its own group key too). Strip the
        // field afterward: a self-created key envelope still has outgoing
        // work ahead of it, and `check_outgoing` refuses to send anything
        // still carrying raw secret material.
        //
        // `unblock_waiters` below only checks waiters keyed by the id
        // actually named in `env.deps` (`resolve_deps`/`event_crypto`'s
        // "key:{group_id}"/"transit_key:{id}" refs) — neither a group_id
        // nor a transit_key_id is in general the event_id of anything, so
        // unblocking only by this event's own id would leave every envelope
        // blocked on a just-unsealed group key or just-announced transit
        // secret stuck forever. `unblock_ids` collects every id this
        // projection just made resolvable.
        let mut unblock_ids = vec![event_id.clone()];

        if let (EventBody::Key(_), Some(secret), Some(group_id)) =
            (&plaintext.body, env.unsealed_secret.clone(), env.group_id.clone())
        {
            ctx.store.put_unsealed_key(&UnsealedKeyRow { group_id: group_id.clone(), secret })?;
            env.unsealed_secret = None;
            unblock_ids.push(group_id);
        }
        if let EventBody::TransitSecret(e) = &plaintext.body {
            if env.flags.self_created {
                unblock_ids.push(e.transit_key_id.clone());
            }
        }

        let deltas = project_body(&plaintext.body, &event_id);
        ctx.store.apply_deltas(&deltas)?;
        env.deltas = deltas;
        env.flags.projected = true;
        ctx.store.mark_stored(&event_id)?;

        let mut unblocked = Vec::new();
        for id in unblock_ids {
            unblocked.extend(unblock_waiters(ctx.store, &id)?);
        }

        // `mark_stored` above is a no-op the first time through (no
        // `EventRow` exists yet for a just-authored or just-decrypted
        // event — `event_store` is what actually inserts one). Requeue the
        // envelope itself, not just what it unblocked, so `event_store`
        // still gets to run and `api::Api::execute_command` has a terminal
        // envelope to read `event_type`/`event_id` off of for its
        // `CommandOutcome`; `!env.flags.projected` keeps this handler from
        // matching it a second time.
        unblocked.push(env);
        Ok(unblocked)
    }
}

fn project_body(body: &EventBody, event_id: &str) -> Vec<Delta> {
    match body {
        EventBody::Identity(e) => {
            let mut deltas = vec![Delta::InsertPeer(PeerRow {
                peer_id: event_id.to_string(),
                network_id: e.network_id.clone(),
                public_key: hex::decode(&e.public_key).unwrap_or_default(),
                seal_public_key: hex::decode(&e.seal_public_key).unwrap_or_default(),
                added_at: e.created_at,
            })];
            if let Some(invite_code) = &e.invite_code {
                deltas.push(Delta::MarkInviteUsed {
                    invite_code: invite_code.clone(),
                    used_by: event_id.to_string(),
                    used_at: e.created_at,
                });
            }
            deltas
        }
        EventBody::Network(e) => vec![Delta::InsertNetwork(NetworkRow {
            network_id: e.network_id.clone(),
            name: e.name.clone(),
            description: e.description.clone(),
            creator_id: e.creator_id.clone(),
            created_at: e.created_at,
        })],
        EventBody::User(e) => vec![Delta::InsertUser(UserRow {
            user_id: event_id.to_string(),
            peer_id: e.peer_id.clone(),
            network_id: e.network_id.clone(),
            name: e.name.clone(),
            joined_at: e.created_at,
            last_address: Some(e.address.clone()),
            last_port: Some(e.port),
        })],
        EventBody::Group(e) => vec![
            Delta::InsertGroup(GroupRow {
                group_id: event_id.to_string(),
                network_id: e.network_id.clone(),
                name: e.name.clone(),
                creator_id: e.creator_id.clone(),
                owner_id: e.creator_id.clone(),
                created_at: e.created_at,
                permissions_json: serde_json::to_string(&e.permissions).unwrap_or_default(),
            }),
            Delta::InsertGroupMember(GroupMemberRow {
                group_id: event_id.to_string(),
                user_id: e.creator_id.clone(),
                added_by: e.creator_id.clone(),
                added_at: e.created_at,
            }),
        ],
        EventBody::Channel(e) => vec![Delta::InsertChannel(ChannelRow {
            channel_id: event_id.to_string(),
            group_id: e.group_id.clone(),
            network_id: e.network_id.clone(),
            name: e.name.clone(),
            creator_id: e.creator_id.clone(),
            created_at: e.created_at,
            description: e.description.clone(),
        })],
        EventBody::Message(e) => vec![Delta::InsertMessage(MessageRow {
            message_id: event_id.to_string(),
            channel_id: e.channel_id.clone(),
            group_id: e.group_id.clone(),
            network_id: e.network_id.clone(),
            author_id: e.peer_id.clone(),
            content: e.content.clone(),
            created_at: e.created_at,
        })],
        EventBody::Invite(e) => vec![Delta::InsertInvite(InviteRow {
            invite_code: e.invite_code.clone(),
            network_id: e.network_id.clone(),
            inviter_id: e.inviter_id.clone(),
            created_at: e.created_at,
            expires_at: e.expires_at,
            target_user_id: e.target_user_id.clone(),
        })],
        EventBody::Address(e) => vec![Delta::InsertAddress(AddressRow {
            address_id: event_id.to_string(),
            peer_id: e.peer_id.clone(),
            user_id: e.user_id.clone(),
            network_id: e.network_id.clone(),
            address: e.address.clone(),
            port: e.port,
            is_active: true,
            timestamp: e.timestamp,
        })],
        EventBody::TransitSecret(e) => vec![Delta::InsertPeerTransitKey(PeerTransitKeyRow {
            transit_key_id: e.transit_key_id.clone(),
            peer_id: e.peer_id.clone(),
            network_id: e.network_id.clone(),
            created_at: e.created_at,
        })],
        // `key` events project nothing to the business tables — their
        // payload lives in `unsealed_keys`, written by event-crypto's
        // Unseal step, not here. `sync_request` is ephemeral by design
        // (see its doc comment) and has no projected table either.
        EventBody::Key(_) | EventBody::SyncRequest(_) => Vec::new(),
    }
}
