//! §4.4 Commands: build self-created envelopes for `Pipeline::drive` to run.
//! Grounded on `original_source/protocols/quiet/commands.py`'s
//! `{command_name: build_fn}` dispatch table — replaced here with a
//! `Command` trait and an explicit registry, the same translation
//! `HandlerRegistry` already applies to the original's handler dict.
//!
//! A command never touches the store beyond reading it: it returns the
//! envelope(s) a caller then hands to `Pipeline::drive` in the same
//! transaction as everything else. It is the pipeline itself — `signature`,
//! `validate`, `project` — that turns a command's draft into a signed,
//! stored, projected event; a command's job stops at producing a plausible
//! draft with the right shape for those handlers to accept.

use serde_json::Value;

use quiet_core::{crypto, CryptoMode, Envelope, EventBody, EventPlaintext};

use crate::error::{Error, Result};
use crate::store::ReadStore;

mod accept_invite;
mod announce_transit_secret;
mod create_channel;
mod create_group;
mod create_identity;
mod create_invite;
mod create_key;
mod create_message;
mod create_network;
mod create_user;
mod register_address;
mod request_sync;

pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, params: Value, store: &ReadStore, mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>>;
}

pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { commands: Vec::new() }
    }

    pub fn register(&mut self, command: Box<dyn Command>) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn dispatch(&self, name: &str, params: Value, store: &ReadStore, mode: CryptoMode, now_ms: i64) -> Result<Vec<Envelope>> {
        let command = self.commands.iter().find(|c| c.name() == name);
        match command {
            Some(c) => c.run(params, store, mode, now_ms),
            None => Err(Error::UnknownCommand(name.to_string())),
        }
    }

    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(Box::new(create_identity::CreateIdentity))
            .register(Box::new(create_network::CreateNetwork))
            .register(Box::new(create_user::CreateUser))
            .register(Box::new(accept_invite::AcceptInvite))
            .register(Box::new(create_group::CreateGroup))
            .register(Box::new(create_channel::CreateChannel))
            .register(Box::new(create_message::CreateMessage))
            .register(Box::new(create_invite::CreateInvite))
            .register(Box::new(create_key::CreateKey))
            .register(Box::new(announce_transit_secret::AnnounceTransitSecret))
            .register(Box::new(register_address::RegisterAddress))
            .register(Box::new(request_sync::RequestSync));
        r
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a required string field out of a command's JSON params.
pub(crate) fn required_str(params: &Value, field: &str) -> Result<String> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Core(quiet_core::Error::InputMalformed(format!("missing or non-string field: {field}"))))
}

pub(crate) fn optional_str(params: &Value, field: &str) -> Option<String> {
    params.get(field).and_then(|v| v.as_str()).map(|s| s.to_string())
}

pub(crate) fn required_i64(params: &Value, field: &str) -> Result<i64> {
    params
        .get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::Core(quiet_core::Error::InputMalformed(format!("missing or non-numeric field: {field}"))))
}

pub(crate) fn required_u16(params: &Value, field: &str) -> Result<u16> {
    params
        .get(field)
        .and_then(|v| v.as_u64())
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| Error::Core(quiet_core::Error::InputMalformed(format!("missing, non-numeric, or out-of-range field: {field}"))))
}

/// A self-created, signature-pending envelope for a signed (non-bootstrap,
/// non-`key`) event type: the common shape every command but `create_key`
/// (sealed, no signer) and `create_identity`/(bootstrap self-authenticates)
/// builds. `signature`/`validate`/`event_crypto` fill in the rest.
pub(crate) fn self_created_envelope(peer_id: &str, body: EventBody) -> Result<Envelope> {
    let plaintext = EventPlaintext::new(body);
    let mut env = Envelope::new();
    env.event_type = Some(plaintext.event_type().as_str().to_string());
    env.peer_id = Some(peer_id.to_string());
    env.event_plaintext = Some(serde_json::to_value(&plaintext).map_err(quiet_core::Error::from)?);
    env.flags.self_created = true;
    env.flags.deps_included_and_valid = true;
    Ok(env)
}

/// The event id a bootstrap event (`identity`, `network`, `user`, `group`,
/// `channel`... see DESIGN.md Open Question Decision #6 for the exact list,
/// though in practice only `identity` needs this) will be assigned once it
/// reaches `event_crypto::encrypt` — computed the same way encrypt itself
/// will, from the canonical plaintext bytes alone, which is deterministic
/// and known before the pipeline ever runs. Lets a multi-envelope command
/// (`create_network`, `accept_invite`) reference an identity it is creating
/// in the same batch by its real future id, instead of some placeholder
/// that would need reconciling after the fact.
pub(crate) fn future_event_id(body: &EventBody) -> Result<String> {
    let plaintext = EventPlaintext::new(body.clone());
    let canonical = quiet_core::canonical::canonicalize_plaintext(&plaintext)?;
    Ok(crypto::event_id_for_ciphertext(&canonical))
}

/// A fresh identity keypair plus the envelope announcing it, sharing the
/// exact private material the command layer needs to carry in
/// `local_metadata` regardless of which higher-level command is minting the
/// identity (`create_identity` on its own, or `create_network`/
/// `accept_invite` alongside a dependent event).
pub(crate) struct FreshIdentity {
    pub envelope: Envelope,
    pub peer_id: String,
}

pub(crate) fn build_identity_envelope(
    network_id: &str,
    name: Option<String>,
    invite_code: Option<String>,
    mode: CryptoMode,
    now_ms: i64,
) -> Result<FreshIdentity> {
    let signing = crypto::keypair(mode);
    let sealing = crypto::seal_keypair(mode);

    // `peer_id` here is never trusted by the projector — an identity's row
    // is always keyed by the event's own content-addressed id (DESIGN.md
    // "ignored body field" note), not this field — so there's no chicken-
    // and-egg problem using the signing public key as a non-empty
    // placeholder validate.rs's "peer_id must be present" rule is happy with.
    let body = EventBody::Identity(quiet_core::event::IdentityEvent {
        peer_id: signing.public_key.clone(),
        network_id: network_id.to_string(),
        name,
        created_at: now_ms,
        invite_code,
        public_key: signing.public_key.clone(),
        seal_public_key: sealing.public_key.clone(),
    });
    let peer_id = future_event_id(&body)?;

    let plaintext = EventPlaintext::new(body);
    let mut env = Envelope::new();
    env.event_type = Some(plaintext.event_type().as_str().to_string());
    env.peer_id = Some(peer_id.clone());
    env.event_plaintext = Some(serde_json::to_value(&plaintext).map_err(quiet_core::Error::from)?);
    env.flags.self_created = true;
    env.flags.deps_included_and_valid = true;
    env.local_metadata = Some(quiet_core::LocalMetadata {
        private_key: Some(signing.private_key),
        public_key: Some(signing.public_key),
        seal_private_key: Some(sealing.private_key),
        transit_secret: None,
    });

    Ok(FreshIdentity { envelope: env, peer_id })
}
