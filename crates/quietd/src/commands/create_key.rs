//! Grounded on `original_source/protocols/quiet/events/key/commands.py`.
//! Mints one group secret and seals one copy of it to every current member
//! (see DESIGN.md Open Question Decision #8) — a `key` event has no signer
//! and never goes through `self_created_envelope`'s signed-event shape.

use quiet_core::{crypto, CryptoMode, Envelope, EventBody, EventPlaintext};
use serde_json::Value;

use super::{required_str, Command};
use crate::error::{Error, Result};
use crate::store::ReadStore;

pub struct CreateKey;

impl Command for CreateKey {
    fn name(&self) -> &'static str {
        "create_key"
    }

    fn run(&self, params: Value, store: &ReadStore, _mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let group_id = required_str(&params, "group_id")?;
        let creator_id = required_str(&params, "creator_id")?;

        let members = store.list_group_members(&group_id)?;
        if members.is_empty() {
            return Err(Error::Core(quiet_core::Error::InputMalformed(format!("group {group_id} has no members"))));
        }

        let secret = crypto::random_secret();
        let key_id = hex::encode(crypto::blake2b(&secret, 32));

        let mut envelopes = Vec::with_capacity(members.len());
        for member in members {
            // `GroupMemberRow::user_id` is populated, at every insertion
            // site (`project.rs`'s `Group` branch, off `GroupEvent::
            // creator_id`), with a peer_id, not a row key into `users` —
            // `membership_check`'s own creator fast path compares
            // `group.creator_id` straight against `env.peer_id` on that
            // same assumption. Sealing a key needs the recipient's
            // `seal_public_key`, which only `peers` carries, so this reads
            // `get_peer` directly rather than bouncing through `get_user`.
            let peer_id = member.user_id.clone();
            let Some(_peer) = store.get_peer(&peer_id)? else { continue };

            let body = EventBody::Key(quiet_core::event::KeyEvent {
                key_id: key_id.clone(),
                group_id: group_id.clone(),
                secret: secret.to_vec(),
                prekey_id: None,
                tag_id: None,
                created_at: now_ms,
            });
            let plaintext = EventPlaintext::new(body);

            let mut env = Envelope::new();
            env.event_type = Some(plaintext.event_type().as_str().to_string());
            env.event_plaintext = Some(serde_json::to_value(&plaintext).map_err(quiet_core::Error::from)?);
            env.group_id = Some(group_id.clone());
            env.seal_to = Some(peer_id.clone());
            env.flags.self_created = true;
            env.flags.deps_included_and_valid = true;

            // The creator holds the group key too: `unseal` only ever runs
            // against a received sealed ciphertext, so its own copy needs
            // the secret attached directly for `project` to persist.
            if peer_id == creator_id {
                env.unsealed_secret = Some(secret.to_vec());
            }

            envelopes.push(env);
        }

        Ok(envelopes)
    }
}
