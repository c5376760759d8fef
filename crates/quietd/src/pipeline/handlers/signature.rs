//! §4.3.6 Signature. Grounded on
//! `original_source/protocols/quiet/handlers/signature.py` /
//! `signature_handler.py`.

use quiet_core::{Envelope, EventPlaintext, EventType};

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

pub struct Signature;

impl Handler for Signature {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn filter(&self, env: &Envelope) -> bool {
        is_sign_ready(env) || is_verify_ready(env) || is_self_authenticated(env)
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        if is_sign_ready(&env) {
            return sign(env, ctx);
        }
        if is_self_authenticated(&env) {
            // Self-created `key`/`identity` events never reach `sign()` (see
            // `excluded_from_signing`), but still need `sig_checked` set or
            // every later handler's filter (membership, validate) stays
            // closed forever — there's no third-party signature to embed,
            // so this is the self-created mirror of `verify()`'s
            // trust-on-first-use/sealed-box branches below.
            env.flags.sig_checked = true;
            return Ok(vec![env]);
        }
        verify(env, ctx)
    }
}

fn excluded_from_signing(event_type: &str) -> bool {
    // `key` events authenticate via the sealed box itself (event-crypto's
    // Unseal sets `sig_checked` directly); `identity` events are the
    // trust-on-first-use bootstrap case, accepted without a third-party
    // signature to check against.
    event_type == "key" || event_type == "identity"
}

fn is_sign_ready(env: &Envelope) -> bool {
    env.flags.self_created
        && env.flags.deps_included_and_valid
        && env.event_plaintext.is_some()
        && env.event_type.as_deref().map(|t| !excluded_from_signing(t)).unwrap_or(false)
        && !has_embedded_signature(env)
        && !env.flags.sig_checked
}

fn is_self_authenticated(env: &Envelope) -> bool {
    env.flags.self_created
        && !env.flags.sig_checked
        && env.event_plaintext.is_some()
        && env.event_type.as_deref().map(excluded_from_signing).unwrap_or(false)
}

fn is_verify_ready(env: &Envelope) -> bool {
    !env.flags.self_created
        && !env.flags.sig_checked
        && env.event_plaintext.is_some()
        && env.event_type.as_deref().map(|t| !t.is_empty()).unwrap_or(false)
        // A sync-response envelope must clear correlation/dedup in
        // `pipeline::handlers::sync::SyncResponseHandler` first; that
        // handler strips `in_response_to` once it lets the event continue,
        // at which point this filter opens up on the next pass.
        && env.in_response_to.is_none()
}

fn has_embedded_signature(env: &Envelope) -> bool {
    env.event_plaintext
        .as_ref()
        .and_then(|v| v.get("signature"))
        .map(|s| !s.is_null())
        .unwrap_or(false)
}

fn sign(mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
    let Some(peer_id) = env.peer_id.clone() else {
        env.error = Some("self-created event has no peer_id to sign under".to_string());
        return Ok(vec![]);
    };
    let Some(signing_key) = ctx.store.get_signing_key(&peer_id)? else {
        // A multi-envelope command (e.g. create_network) can seed a
        // dependent event in the same pass as the identity it's signed by,
        // before that identity's own signing key has been projected yet.
        // Block on it exactly like any other dependency rather than
        // dropping the envelope outright.
        let dep = format!("identity:{peer_id}");
        if !env.deps.contains(&dep) {
            env.deps.push(dep.clone());
        }
        env.flags.missing_deps = true;
        env.missing_dep_list = vec![dep];
        env.flags.deps_included_and_valid = false;
        return Ok(vec![env]);
    };

    let Some(value) = env.event_plaintext.clone() else { return Ok(vec![env]) };
    let plaintext: EventPlaintext = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => {
            env.error = Some(format!("plaintext malformed before signing: {e}"));
            return Ok(vec![]);
        }
    };

    let canonical = match quiet_core::canonical::canonicalize_plaintext(&plaintext) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.error = Some(format!("canonicalization failed: {e}"));
            return Ok(vec![]);
        }
    };

    let signature = match quiet_core::crypto::sign(ctx.crypto_mode, &canonical, &signing_key.private_key) {
        Ok(sig) => sig,
        Err(e) => {
            env.error = Some(format!("signing failed: {e}"));
            return Ok(vec![]);
        }
    };

    let mut signed = plaintext;
    signed.signature = Some(signature);
    env.event_plaintext = Some(serde_json::to_value(&signed).map_err(quiet_core::Error::from)?);
    env.flags.sig_checked = true;
    env.flags.self_signed = true;
    Ok(vec![env])
}

fn verify(mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
    let event_type = env.event_type.clone().unwrap_or_default();
    if event_type == EventType::Identity.as_str() {
        // Accepted on trust-on-first-use terms (Open Question Decision #4):
        // there's no prior public key to verify an identity event against.
        env.flags.sig_checked = true;
        return Ok(vec![env]);
    }
    if event_type == EventType::Key.as_str() {
        // Authenticated implicitly by the sealed box already opened.
        env.flags.sig_checked = true;
        return Ok(vec![env]);
    }

    let Some(value) = env.event_plaintext.clone() else { return Ok(vec![env]) };
    let plaintext: EventPlaintext = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => {
            env.error = Some(format!("plaintext malformed before verification: {e}"));
            return Ok(vec![]);
        }
    };
    let Some(signature) = plaintext.signature.clone() else {
        env.flags.sig_failed = true;
        env.error = Some("missing signature".to_string());
        return Ok(vec![]);
    };

    let Some(peer_id) = env.peer_id.clone() else {
        env.flags.sig_failed = true;
        env.error = Some("no peer_id to resolve signer's public key".to_string());
        return Ok(vec![]);
    };

    let public_key = resolve_signer_public_key(&env, &peer_id, ctx)?;
    let Some(public_key) = public_key else {
        let dep = format!("peer:{peer_id}");
        if !env.deps.contains(&dep) {
            env.deps.push(dep.clone());
        }
        env.flags.missing_deps = true;
        env.missing_dep_list = vec![dep];
        env.flags.deps_included_and_valid = false;
        return Ok(vec![env]);
    };

    let mut unsigned = plaintext.clone();
    unsigned.signature = None;
    let canonical = match quiet_core::canonical::canonicalize_plaintext(&unsigned) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.error = Some(format!("canonicalization failed: {e}"));
            return Ok(vec![]);
        }
    };

    match quiet_core::crypto::verify(ctx.crypto_mode, &canonical, &signature, &public_key) {
        Ok(true) => {
            env.flags.sig_checked = true;
            Ok(vec![env])
        }
        Ok(false) => {
            env.flags.sig_failed = true;
            env.error = Some("signature verification failed".to_string());
            Ok(vec![])
        }
        Err(e) => {
            env.flags.sig_failed = true;
            env.error = Some(format!("signature verification error: {e}"));
            Ok(vec![])
        }
    }
}

/// Prefer a resolved `peer:`/`identity:` dependency already in hand; fall
/// back to the peer row already projected locally.
fn resolve_signer_public_key(env: &Envelope, peer_id: &str, ctx: &PipelineCtx) -> Result<Option<String>> {
    for key in [format!("peer:{peer_id}"), format!("identity:{peer_id}")] {
        if let Some(quiet_core::ResolvedDep::Event { plaintext, .. }) = env.resolved_deps.get(&key) {
            if let Some(pk) = plaintext.get("public_key").and_then(|v| v.as_str()) {
                return Ok(Some(pk.to_string()));
            }
        }
    }
    match ctx.store.get_peer(peer_id)? {
        Some(row) => Ok(Some(hex::encode(row.public_key))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiet_core::event::MessageEvent;
    use quiet_core::EventBody;

    fn ctx_with<'a>(
        store: &'a crate::store::WriteStore,
        cache: &'a mut std::collections::HashMap<String, crate::pipeline::ctx::SyncCacheEntry>,
    ) -> PipelineCtx<'a> {
        PipelineCtx { store, crypto_mode: quiet_core::CryptoMode::Dummy, now_ms: 0, outbox: vec![], sync_cache: cache }
    }

    #[test]
    fn identity_events_pass_without_real_signature() {
        let store = crate::store::Store::open_in_memory().unwrap();
        let mut env = Envelope::new();
        env.event_type = Some("identity".into());
        env.event_plaintext = Some(serde_json::json!({"type": "identity"}));

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                Signature.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out[0].flags.sig_checked);
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let store = crate::store::Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                let kp = quiet_core::crypto::keypair(quiet_core::CryptoMode::Dummy);
                w.put_signing_key(&crate::store::SigningKeyRow {
                    peer_id: "p1".into(),
                    private_key: kp.private_key.clone(),
                    seal_private_key: "be".repeat(32),
                })?;
                w.apply_deltas(&[quiet_core::Delta::InsertPeer(quiet_core::delta::PeerRow {
                    peer_id: "p1".into(),
                    network_id: "n1".into(),
                    public_key: hex::decode(&kp.public_key).unwrap(),
                    seal_public_key: hex::decode("ab".repeat(32)).unwrap(),
                    added_at: 0,
                })])
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
        env.flags.self_created = true;
        env.flags.deps_included_and_valid = true;
        env.peer_id = Some("p1".into());
        env.event_type = Some("message".into());
        env.event_plaintext = Some(serde_json::to_value(&plaintext).unwrap());

        let mut cache = std::collections::HashMap::new();
        let signed = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                Signature.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(signed.len(), 1);
        assert!(signed[0].flags.self_signed);

        let mut incoming = signed[0].clone();
        incoming.flags.self_created = false;
        incoming.flags.sig_checked = false;
        incoming.flags.self_signed = false;

        let mut cache2 = std::collections::HashMap::new();
        let verified = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache2);
                Signature.process(incoming, &mut ctx)
            })
            .unwrap();
        assert_eq!(verified.len(), 1);
        assert!(verified[0].flags.sig_checked);
        assert!(!verified[0].flags.sig_failed);
    }

    #[test]
    fn tampered_signature_fails() {
        let store = crate::store::Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.apply_deltas(&[quiet_core::Delta::InsertPeer(quiet_core::delta::PeerRow {
                    peer_id: "p1".into(),
                    network_id: "n1".into(),
                    public_key: hex::decode("deadbeef").unwrap(),
                    seal_public_key: hex::decode("beefdead").unwrap(),
                    added_at: 0,
                })])
            })
            .unwrap();

        let mut plaintext = EventPlaintext::new(EventBody::Message(MessageEvent {
            channel_id: "c1".into(),
            group_id: "g1".into(),
            network_id: "n1".into(),
            peer_id: "p1".into(),
            content: "hi".into(),
            created_at: 0,
        }));
        plaintext.signature = Some("not-a-real-signature".into());

        let mut env = Envelope::new();
        env.peer_id = Some("p1".into());
        env.event_type = Some("message".into());
        env.event_plaintext = Some(serde_json::to_value(&plaintext).unwrap());

        let mut cache = std::collections::HashMap::new();
        let out = store
            .write_txn(|w| {
                let mut ctx = ctx_with(w, &mut cache);
                Signature.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }
}
