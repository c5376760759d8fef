//! §4.3.5 Event-crypto. The three sub-paths the spec distinguishes by
//! envelope shape — Unseal, Decrypt, Encrypt — plus a fourth this crate
//! adds for the bootstrap events (`identity`/`network`) that precede any
//! group or transit key material existing: their "ciphertext" is simply
//! their canonical plaintext bytes (DESIGN.md Open Question Decision #4).
//! No specific original-source file for this handler's body was available
//! in the retrieval pack (only the thin dispatch wrapper was); behavior
//! here follows the spec prose directly, composed from the same
//! ECDH/sealed-box/AEAD primitives the ported `crypto` module already uses.

use quiet_core::{Envelope, EventPlaintext, KeyRef, KeyRefKind};

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

pub struct EventCrypto;

impl Handler for EventCrypto {
    fn name(&self) -> &'static str {
        "event_crypto"
    }

    fn filter(&self, env: &Envelope) -> bool {
        is_unseal(env) || is_decrypt(env) || is_bootstrap_decrypt(env) || is_encrypt(env)
    }

    fn process(&self, env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        if is_unseal(&env) {
            return unseal(env, ctx);
        }
        if is_decrypt(&env) {
            return decrypt_group(env, ctx);
        }
        if is_bootstrap_decrypt(&env) {
            return bootstrap_decrypt(env);
        }
        encrypt(env, ctx)
    }
}

fn is_unseal(env: &Envelope) -> bool {
    matches!(env.key_ref, Some(KeyRef { kind: KeyRefKind::Peer, .. }))
        && env.event_ciphertext.is_some()
        && env.event_plaintext.is_none()
}

fn is_decrypt(env: &Envelope) -> bool {
    matches!(env.key_ref, Some(KeyRef { kind: KeyRefKind::Key, .. }))
        && env.event_ciphertext.is_some()
        && env.event_plaintext.is_none()
}

fn is_bootstrap_decrypt(env: &Envelope) -> bool {
    env.key_ref.is_none() && env.event_ciphertext.is_some() && env.event_plaintext.is_none()
}

fn is_encrypt(env: &Envelope) -> bool {
    env.flags.validated && env.event_plaintext.is_some() && env.event_ciphertext.is_none()
}

/// Strip the canonical form's trailing NUL padding and parse the JSON
/// object that remains.
fn parse_canonical(bytes: &[u8]) -> Result<EventPlaintext> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(serde_json::from_slice(&bytes[..end]).map_err(quiet_core::Error::from)?)
}

fn unseal(mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
    let key_ref = env.key_ref.clone().expect("checked by is_unseal");
    let Some(signing_key) = ctx.store.get_signing_key(&key_ref.id)? else {
        // Not addressed to any identity we hold locally; nothing further to
        // do with it.
        env.error = Some(format!("key event sealed to unknown local identity: {}", key_ref.id));
        return Ok(vec![]);
    };

    let seal_private = match hex::decode(&signing_key.seal_private_key) {
        Ok(bytes) if bytes.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(&bytes);
            out
        }
        _ => {
            env.error = Some("malformed local seal private key".to_string());
            return Ok(vec![]);
        }
    };

    let ciphertext = env.event_ciphertext.clone().unwrap_or_default();
    let plaintext_bytes = match quiet_core::crypto::sealed_box_open(ctx.crypto_mode, &ciphertext, &seal_private) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.error = Some(format!("key unseal failed: {e}"));
            return Ok(vec![]);
        }
    };

    let plaintext = match parse_canonical(&plaintext_bytes) {
        Ok(p) => p,
        Err(e) => {
            env.error = Some(format!("unsealed key payload malformed: {e}"));
            return Ok(vec![]);
        }
    };

    let quiet_core::EventBody::Key(key_event) = &plaintext.body else {
        env.error = Some("sealed event is not a key event".to_string());
        return Ok(vec![]);
    };

    env.group_id = Some(key_event.group_id.clone());
    env.unsealed_secret = Some(key_event.secret.clone());
    env.event_plaintext = Some(serde_json::to_value(&plaintext).map_err(quiet_core::Error::from)?);
    env.event_type = Some("key".to_string());
    env.flags.write_to_store = true;
    // Sealed boxes authenticate implicitly (only the holder of the
    // recipient's private key could have produced something that opens).
    env.flags.sig_checked = true;

    Ok(vec![env])
}

fn decrypt_group(mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
    let key_ref = env.key_ref.clone().expect("checked by is_decrypt");
    let Some(row) = ctx.store.get_unsealed_key(&key_ref.id)? else {
        // We don't (yet) hold this group's key; block on it like any other
        // dependency rather than dropping the envelope outright. The dep
        // ref has to land in `env.deps` itself, not just `missing_dep_list`
        // — that's what `resolve_deps` actually blocks the envelope on.
        let dep = format!("key:{}", key_ref.id);
        if !env.deps.contains(&dep) {
            env.deps.push(dep.clone());
        }
        env.flags.missing_deps = true;
        env.missing_dep_list = vec![dep];
        env.flags.deps_included_and_valid = false;
        return Ok(vec![env]);
    };

    let ciphertext = env.event_ciphertext.clone().unwrap_or_default();
    let secret: [u8; 32] = match row.secret.as_slice().try_into() {
        Ok(s) => s,
        Err(_) => {
            env.error = Some("stored group secret has the wrong length".to_string());
            return Ok(vec![]);
        }
    };

    let plaintext_bytes = match quiet_core::crypto::aead_decrypt(ctx.crypto_mode, &ciphertext, &secret) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.error = Some(format!("event decryption failed: {e}"));
            return Ok(vec![]);
        }
    };

    apply_plaintext(&mut env, &plaintext_bytes)?;
    Ok(vec![env])
}

fn bootstrap_decrypt(mut env: Envelope) -> Result<Vec<Envelope>> {
    let ciphertext = env.event_ciphertext.clone().unwrap_or_default();
    apply_plaintext(&mut env, &ciphertext)?;
    Ok(vec![env])
}

/// Every event type names its own author somewhere in its body; `signature`
/// (checked downstream by `pipeline::handlers::signature`) is verified
/// against that identity's public key, and membership/validation checks
/// read it back off the envelope rather than re-parsing the body. `key`
/// events authenticate by sealed-box instead (see `unseal`, which sets
/// `sig_checked` directly) and have no such field.
fn signer_peer_id(body: &quiet_core::EventBody) -> Option<String> {
    use quiet_core::EventBody::*;
    match body {
        Identity(e) => Some(e.peer_id.clone()),
        Network(e) => Some(e.creator_id.clone()),
        User(e) => Some(e.peer_id.clone()),
        Group(e) => Some(e.creator_id.clone()),
        Channel(e) => Some(e.creator_id.clone()),
        Message(e) => Some(e.peer_id.clone()),
        Invite(e) => Some(e.inviter_id.clone()),
        Key(_) => None,
        TransitSecret(e) => Some(e.peer_id.clone()),
        Address(e) => Some(e.peer_id.clone()),
        SyncRequest(e) => Some(e.peer_id.clone()),
    }
}

fn apply_plaintext(env: &mut Envelope, canonical_bytes: &[u8]) -> Result<()> {
    match parse_canonical(canonical_bytes) {
        Ok(plaintext) => {
            let event_type = plaintext.event_type();
            env.event_type = Some(event_type.as_str().to_string());
            if env.peer_id.is_none() {
                env.peer_id = signer_peer_id(&plaintext.body);
            }
            // A decoded, received event is gossip: it needs to land in the
            // local store once it clears the rest of the chain, same as a
            // self-authored one. Sync requests are the one exception (see
            // `SyncRequestEvent`'s own doc comment).
            if !matches!(event_type, quiet_core::EventType::SyncRequest) {
                env.flags.write_to_store = true;
            }
            env.event_plaintext = Some(serde_json::to_value(&plaintext).map_err(quiet_core::Error::from)?);
        }
        Err(e) => {
            env.error = Some(format!("event payload malformed: {e}"));
        }
    }
    Ok(())
}

fn encrypt(mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
    let Some(value) = env.event_plaintext.clone() else { return Ok(vec![env]) };
    let plaintext: EventPlaintext = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => {
            env.error = Some(format!("outbound plaintext malformed: {e}"));
            return Ok(vec![]);
        }
    };

    // The wire payload has to carry the signature `sign()` already embedded
    // in `plaintext` (absent only for the trust-on-first-use/sealed-box
    // types that never get one) — `canonicalize_plaintext` strips that
    // field because it's the *signing input*, not the transmitted form, so
    // building the ciphertext from it would silently drop every event's
    // signature before it ever reaches a peer's `verify()`. `canonical_bytes`
    // is the same sorted-key, NUL-padded encoding without the strip.
    let wire_bytes = match quiet_core::canonical::canonical_bytes(&plaintext) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.error = Some(format!("canonicalization failed: {e}"));
            return Ok(vec![]);
        }
    };

    let event_type = plaintext.event_type();
    // Sync requests are probes, not group state: they carry no group key
    // and (per `SyncRequestEvent`'s own doc comment) are never persisted,
    // so they ride the same plaintext-as-ciphertext path bootstrap events
    // use rather than blocking on a key that will never exist for them.
    // `user`/`address`/`transit_secret`/`invite` are network-directory
    // information rather than group content (DESIGN.md Open Question
    // Decision #6): a peer has to be discoverable, and an invite code has
    // to be shareable, before any group key could plausibly exist, so
    // these ride the bootstrap path too rather than gating on a group that
    // may not exist yet. `group` joins them for the same reason one level
    // down: a group's own creation event has to be visible network-wide
    // before its `key` event (sealed individually to members) can exist to
    // encrypt anything under — group *content* (channels, messages) stays
    // on the group-key path below.
    let is_bootstrap = matches!(
        event_type,
        quiet_core::EventType::Identity
            | quiet_core::EventType::Network
            | quiet_core::EventType::SyncRequest
            | quiet_core::EventType::User
            | quiet_core::EventType::Address
            | quiet_core::EventType::TransitSecret
            | quiet_core::EventType::Invite
            | quiet_core::EventType::Group
    );

    let ciphertext = if is_bootstrap {
        wire_bytes.to_vec()
    } else if let Some(peer_id) = env.seal_to.clone() {
        let Some(peer) = ctx.store.get_peer(&peer_id)? else {
            env.error = Some(format!("unknown recipient peer: {peer_id}"));
            return Ok(vec![]);
        };
        let recipient_pub: [u8; 32] = match peer.seal_public_key.as_slice().try_into() {
            Ok(p) => p,
            Err(_) => {
                env.error = Some("recipient's seal public key has the wrong length".to_string());
                return Ok(vec![]);
            }
        };
        env.key_ref = Some(KeyRef { kind: KeyRefKind::Peer, id: peer_id.clone() });
        env.event_key_id = Some(peer_id);
        match quiet_core::crypto::sealed_box_encrypt(ctx.crypto_mode, &wire_bytes, &recipient_pub) {
            Ok(c) => c,
            Err(e) => {
                env.error = Some(format!("sealing failed: {e}"));
                return Ok(vec![]);
            }
        }
    } else if let Some(group_id) = env.group_id.clone() {
        let Some(row) = ctx.store.get_unsealed_key(&group_id)? else {
            let dep = format!("key:{group_id}");
            if !env.deps.contains(&dep) {
                env.deps.push(dep.clone());
            }
            env.flags.missing_deps = true;
            env.missing_dep_list = vec![dep];
            env.flags.deps_included_and_valid = false;
            return Ok(vec![env]);
        };
        let secret: [u8; 32] = match row.secret.as_slice().try_into() {
            Ok(s) => s,
            Err(_) => {
                env.error = Some("stored group secret has the wrong length".to_string());
                return Ok(vec![]);
            }
        };
        env.key_ref = Some(KeyRef { kind: KeyRefKind::Key, id: group_id.clone() });
        env.event_key_id = Some(group_id);
        match quiet_core::crypto::aead_encrypt(ctx.crypto_mode, &wire_bytes, &secret) {
            Ok(c) => c,
            Err(e) => {
                env.error = Some(format!("encryption failed: {e}"));
                return Ok(vec![]);
            }
        }
    } else {
        env.error = Some(format!("cannot determine key reference for outbound {} event", event_type.as_str()));
        return Ok(vec![]);
    };

    env.event_id = Some(quiet_core::crypto::event_id_for_ciphertext(&ciphertext));
    env.event_ciphertext = Some(ciphertext);

    if let quiet_core::EventBody::SyncRequest(req) = &plaintext.body {
        if let Some(transit_secret) = req.transit_secret.clone() {
            ctx.cache_sync_request(req.request_id.clone(), transit_secret, req.network_id.clone());
        }
    } else {
        env.flags.write_to_store = true;
    }

    Ok(vec![env])
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiet_core::event::{IdentityEvent, MessageEvent};
    use quiet_core::EventBody;

    fn ctx_with<'a>(
        store: &'a crate::store::WriteStore,
        cache: &'a mut std::collections::HashMap<String, crate::pipeline::ctx::SyncCacheEntry>,
    ) -> PipelineCtx<'a> {
        PipelineCtx { store, crypto_mode: quiet_core::CryptoMode::Dummy, now_ms: 0, outbox: vec![], sync_cache: cache }
    }

    #[test]
    fn bootstrap_identity_round_trips_without_real_encryption() {
        let store = crate::store::Store::open_in_memory().unwrap();
        let plaintext = EventPlaintext::new(EventBody::Identity(IdentityEvent {
            peer_id: "p1".into(),
            network_id: "n1".into(),
            name: None,
            created_at: 0,
            invite_code: None,
            public_key: "aa".into(),
            seal_public_key: "bb".into(),
        }));

        let mut env = Envelope::new();
        env.flags.validated = true;
        env.event_plaintext = Some(serde_json::to_value(&plaintext).unwrap());

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                EventCrypto.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].flags.write_to_store);
        assert!(out[0].event_id.is_some());
        assert!(out[0].key_ref.is_none());

        // And it decrypts straight back via the bootstrap path.
        let mut incoming = Envelope::new();
        incoming.event_ciphertext = out[0].event_ciphertext.clone();
        let mut cache2 = std::collections::HashMap::new();
        let decoded = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache2);
                EventCrypto.process(incoming, &mut ctx)
            })
            .unwrap();
        assert_eq!(decoded[0].event_type.as_deref(), Some("identity"));
    }

    #[test]
    fn group_encrypt_then_decrypt_round_trips() {
        let store = crate::store::Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.put_unsealed_key(&crate::store::UnsealedKeyRow { group_id: "g1".into(), secret: vec![5u8; 32] })
            })
            .unwrap();

        let plaintext = EventPlaintext::new(EventBody::Message(MessageEvent {
            channel_id: "c1".into(),
            group_id: "g1".into(),
            network_id: "n1".into(),
            peer_id: "p1".into(),
            content: "hi".into(),
            created_at: 0,
        }));
        let mut env = Envelope::new();
        env.flags.validated = true;
        env.group_id = Some("g1".into());
        env.event_plaintext = Some(serde_json::to_value(&plaintext).unwrap());

        let mut cache = std::collections::HashMap::new();
        let encrypted = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                EventCrypto.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(encrypted.len(), 1);
        assert!(matches!(encrypted[0].key_ref, Some(KeyRef { kind: KeyRefKind::Key, .. })));

        let mut incoming = Envelope::new();
        incoming.key_ref = encrypted[0].key_ref.clone();
        incoming.event_ciphertext = encrypted[0].event_ciphertext.clone();
        let mut cache2 = std::collections::HashMap::new();
        let decoded = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache2);
                EventCrypto.process(incoming, &mut ctx)
            })
            .unwrap();
        assert_eq!(decoded[0].event_type.as_deref(), Some("message"));
    }
}
