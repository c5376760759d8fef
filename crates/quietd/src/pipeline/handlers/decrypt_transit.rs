//! §4.3.4 Decrypt-transit. Grounded on
//! `original_source/protocols/quiet/handlers/decrypt_transit_handler.py`:
//! the transit ciphertext is `nonce(24) ‖ AEAD(JSON{event_key_id,
//! event_ciphertext_hex})` under the transit secret keyed by
//! `transit_key_id`.

use quiet_core::{Envelope, KeyRef, KeyRefKind};

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

pub struct DecryptTransit;

/// `key_kind` disambiguates how event-crypto should treat the inner
/// ciphertext: sealed whole to one peer (`"peer"`, key distribution),
/// AEAD'd under a group key (`"key"`, `event_key_id` is then the
/// `group_id`), or absent for bootstrap events (`identity`/`network`),
/// whose "ciphertext" is just their canonical plaintext bytes.
#[derive(serde::Deserialize)]
struct TransitInner {
    event_key_id: Option<String>,
    key_kind: Option<String>,
    event_ciphertext: String,
    #[serde(default)]
    in_response_to: Option<String>,
}

impl Handler for DecryptTransit {
    fn name(&self) -> &'static str {
        "decrypt_transit"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.flags.deps_included_and_valid
            && env.transit_key_id.is_some()
            && env.transit_ciphertext.is_some()
            && env.event_ciphertext.is_none()
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let transit_key_id = env.transit_key_id.clone().unwrap_or_default();
        let ciphertext = env.transit_ciphertext.clone().unwrap_or_default();

        let Some(key_row) = ctx.store.get_transit_key(&transit_key_id)? else {
            env.error = Some(format!("transit key not found: {transit_key_id}"));
            let dep = format!("transit_key:{transit_key_id}");
            if !env.deps.contains(&dep) {
                env.deps.push(dep.clone());
            }
            env.flags.missing_deps = true;
            env.flags.deps_included_and_valid = false;
            env.missing_dep_list = vec![dep];
            return Ok(vec![env]);
        };

        let plaintext = match quiet_core::crypto::aead_decrypt(ctx.crypto_mode, &ciphertext, &key_row.transit_secret) {
            Ok(p) => p,
            Err(e) => {
                env.error = Some(format!("transit decryption failed: {e}"));
                return Ok(vec![]);
            }
        };

        let inner: TransitInner = match serde_json::from_slice(&plaintext) {
            Ok(v) => v,
            Err(e) => {
                env.error = Some(format!("transit payload malformed: {e}"));
                return Ok(vec![]);
            }
        };

        let event_ciphertext = match hex::decode(&inner.event_ciphertext) {
            Ok(bytes) => bytes,
            Err(e) => {
                env.error = Some(format!("event ciphertext not valid hex: {e}"));
                return Ok(vec![]);
            }
        };

        env.event_id = Some(quiet_core::crypto::event_id_for_ciphertext(&event_ciphertext));
        env.event_ciphertext = Some(event_ciphertext);
        env.key_ref = match (inner.key_kind.as_deref(), &inner.event_key_id) {
            (Some("peer"), Some(id)) => Some(KeyRef { kind: KeyRefKind::Peer, id: id.clone() }),
            (Some("key"), Some(id)) => Some(KeyRef { kind: KeyRefKind::Key, id: id.clone() }),
            _ => None,
        };
        env.event_key_id = inner.event_key_id;
        env.network_id = Some(key_row.network_id.clone());
        env.in_response_to = inner.in_response_to;

        Ok(vec![env])
    }
}
