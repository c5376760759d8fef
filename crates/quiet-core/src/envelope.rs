//! The [`Envelope`]: the record that flows through the handler pipeline.
//!
//! Every field is sparsely populated — a given handler asserts a precondition
//! subset and adds a postcondition subset, per the pipeline's stage contracts.
//! This is one struct rather than an enum per pipeline stage: envelopes
//! accumulate fields incrementally and several independent handler paths can
//! populate the same field (e.g. `event_plaintext` arrives either by
//! decryption or by authoring), so a single sparse record is truer to the
//! data than a family of stage-indexed variants would be.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference to something an event depends on, as a `"kind:id"` pair.
///
/// Parsed from strings like `"transit_key:3af2..."` or `"group:9c01..."`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepRef {
    pub kind: String,
    pub id: String,
}

impl DepRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self { kind: kind.into(), id: id.into() }
    }

    pub fn as_string(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl std::str::FromStr for DepRef {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => {
                Ok(Self::new(kind, id))
            }
            _ => Err(crate::Error::InputMalformed(format!("malformed dep ref: {s}"))),
        }
    }
}

/// A resolved dependency's payload, keyed by the same `DepRef` string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ResolvedDep {
    /// A local transit secret (never the raw secret bytes themselves in an
    /// outgoing envelope — this variant only ever lives on envelopes that
    /// stay in-process).
    TransitKey { transit_key_id: String },
    /// A validated stored event's plaintext, optionally with the local
    /// private key attached (identity/peer deps we hold the secret for).
    Event {
        event_id: String,
        plaintext: Value,
        private_key: Option<String>,
    },
    /// An unsealed group/channel key.
    UnsealedKey { key_id: String, secret: Vec<u8> },
}

/// A reference to the key used to encrypt/decrypt an event's ciphertext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRef {
    pub kind: KeyRefKind,
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyRefKind {
    /// Sealed directly to a peer's identity key (key-distribution events).
    Peer,
    /// A symmetric group/channel key, itself distributed via `Peer`-sealed events.
    Key,
}

/// Local-only secrets attached to a self-created envelope (e.g. a freshly
/// generated identity keypair). Never serialized onto the wire — stripped by
/// the transit-encrypt handler before `send-to-network`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalMetadata {
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    /// Hex X25519 private key paired with the identity's `seal_public_key`,
    /// generated alongside `private_key` at identity-creation time.
    pub seal_private_key: Option<String>,
    /// Hex transit secret for a self-created `transit_secret` event. The
    /// gossiped event body only ever carries the `transit_key_id` it hashes
    /// to (see `event::TransitSecretEvent`); the raw bytes ride here so
    /// `project` can persist them into the local `transit_keys` table
    /// without the secret ever touching the wire.
    pub transit_secret: Option<String>,
}

/// Monotone boolean processing flags (see `Envelope` invariants: once set
/// `true`, a flag is never cleared, except `unblocked` and
/// `deps_included_and_valid`, which a retry pass may reset).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EnvelopeFlags {
    pub self_created: bool,
    pub sig_checked: bool,
    pub sig_failed: bool,
    pub self_signed: bool,
    pub validated: bool,
    pub projected: bool,
    pub stored: bool,
    pub write_to_store: bool,
    pub outgoing: bool,
    pub outgoing_checked: bool,
    pub stripped_for_send: bool,
    pub deps_included_and_valid: bool,
    pub missing_deps: bool,
    pub unblocked: bool,
    pub should_remove: bool,
    pub remove_checked: bool,
    pub is_group_member: bool,
}

/// The envelope. See module docs and `spec` §3 for the full field rationale.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Envelope {
    // Identity / routing
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub peer_id: Option<String>,
    pub network_id: Option<String>,
    pub group_id: Option<String>,
    pub channel_id: Option<String>,

    // Payload
    pub event_plaintext: Option<Value>,
    pub event_ciphertext: Option<Vec<u8>>,
    pub key_ref: Option<KeyRef>,
    pub key_id: Option<String>,
    pub event_key_id: Option<String>,
    pub unsealed_secret: Option<Vec<u8>>,

    // Transit layer
    pub transit_key_id: Option<String>,
    pub transit_ciphertext: Option<Vec<u8>>,
    pub raw_data: Option<Vec<u8>>,

    // Network metadata
    pub origin_ip: Option<String>,
    pub origin_port: Option<u16>,
    pub received_at: Option<i64>,
    pub dest_ip: Option<String>,
    pub dest_port: Option<u16>,
    pub due_ms: Option<i64>,
    pub address_id: Option<String>,
    pub seal_to: Option<String>,

    // Dependencies
    pub deps: Vec<String>,
    pub resolved_deps: HashMap<String, ResolvedDep>,
    pub missing_dep_list: Vec<String>,

    // Sync / reflect
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub transit_secret: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub target_peer_id: Option<String>,
    pub in_response_to: Option<String>,

    // State
    pub flags: EnvelopeFlags,

    // Local-only
    pub local_metadata: Option<LocalMetadata>,

    // Diagnostics
    pub deltas: Vec<crate::delta::Delta>,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `deps` into typed refs, surfacing the first malformed entry.
    pub fn dep_refs(&self) -> crate::Result<Vec<DepRef>> {
        self.deps.iter().map(|s| s.parse()).collect()
    }

    /// True once the envelope carries one of the three states the pipeline
    /// invariant requires: raw bytes just received, a known transit
    /// ciphertext, or plaintext (authored or decrypted).
    pub fn has_known_shape(&self) -> bool {
        self.raw_data.is_some()
            || (self.transit_ciphertext.is_some() && self.transit_key_id.is_some())
            || self.event_plaintext.is_some()
    }
}
