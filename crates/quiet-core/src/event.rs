//! Event plaintext shapes, one variant per `event_type`.
//!
//! Each event type owns a validator, a projector, and usually a command in
//! `quietd`; this module only holds the wire shape. `EventBody` is a tagged
//! enum (`#[serde(tag = "type")]`) rather than a generic map, per the
//! "tagged variants over dynamic dicts" design choice — a validator for
//! `channel` can destructure straight to `EventBody::Channel(fields)`
//! instead of probing a map for keys that may or may not be present.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Identity,
    Network,
    User,
    Group,
    Channel,
    Message,
    Invite,
    Key,
    TransitSecret,
    Address,
    SyncRequest,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Identity => "identity",
            EventType::Network => "network",
            EventType::User => "user",
            EventType::Group => "group",
            EventType::Channel => "channel",
            EventType::Message => "message",
            EventType::Invite => "invite",
            EventType::Key => "key",
            EventType::TransitSecret => "transit_secret",
            EventType::Address => "address",
            EventType::SyncRequest => "sync_request",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "identity" => EventType::Identity,
            "network" => EventType::Network,
            "user" => EventType::User,
            "group" => EventType::Group,
            "channel" => EventType::Channel,
            "message" => EventType::Message,
            "invite" => EventType::Invite,
            "key" => EventType::Key,
            "transit_secret" => EventType::TransitSecret,
            "address" => EventType::Address,
            "sync_request" => EventType::SyncRequest,
            other => return Err(crate::Error::UnknownEventType(other.to_string())),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityEvent {
    pub peer_id: String,
    pub network_id: String,
    pub name: Option<String>,
    pub created_at: i64,
    pub invite_code: Option<String>,
    /// Hex Ed25519 verifying key — how other peers check this identity's
    /// signatures. Carried on the event itself (rather than only in
    /// `local_metadata`) since identity/peer discovery happens by receiving
    /// this event, not by a side channel.
    pub public_key: String,
    /// Hex X25519 public key, used to seal group/channel keys to this
    /// identity (event-crypto's peer-sealed distribution path). Issued
    /// alongside the signing keypair, not derived from it.
    pub seal_public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub network_id: String,
    pub name: String,
    pub description: String,
    pub creator_id: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: String,
    pub peer_id: String,
    pub network_id: String,
    pub name: Option<String>,
    pub address: String,
    pub port: u16,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupEvent {
    pub group_id: String,
    pub name: String,
    pub network_id: String,
    pub creator_id: String,
    pub created_at: i64,
    pub permissions: BTreeMap<String, bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub group_id: String,
    pub network_id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: i64,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageEvent {
    pub channel_id: String,
    pub group_id: String,
    pub network_id: String,
    pub peer_id: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InviteEvent {
    pub invite_code: String,
    pub network_id: String,
    pub inviter_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    /// Folded-in `add`/`link_invite` behavior (see DESIGN.md Open Question
    /// #3): set when this invite targets one specific identity rather than
    /// being a generally redeemable code.
    pub target_user_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key_id: String,
    pub group_id: String,
    /// Raw group/channel secret. Safe to carry in plaintext here only
    /// because a `key` event's *ciphertext* is always sealed-box'd whole to
    /// one recipient peer (`key_ref.kind == Peer`) rather than AEAD'd under
    /// a group key like other event types — see event-crypto's Unseal path.
    pub secret: Vec<u8>,
    pub prekey_id: Option<String>,
    pub tag_id: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitSecretEvent {
    pub transit_key_id: String,
    pub peer_id: String,
    pub network_id: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddressEvent {
    pub address_id: String,
    pub peer_id: String,
    pub user_id: String,
    pub network_id: String,
    pub address: String,
    pub port: u16,
    pub timestamp: i64,
}

/// Ephemeral; never persisted in `events`, never projected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRequestEvent {
    pub request_id: String,
    pub network_id: String,
    pub peer_id: String,
    pub user_id: Option<String>,
    pub transit_secret: Option<String>,
    pub timestamp_ms: i64,
    pub target_peer_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Identity(IdentityEvent),
    Network(NetworkEvent),
    User(UserEvent),
    Group(GroupEvent),
    Channel(ChannelEvent),
    Message(MessageEvent),
    Invite(InviteEvent),
    Key(KeyEvent),
    TransitSecret(TransitSecretEvent),
    Address(AddressEvent),
    SyncRequest(SyncRequestEvent),
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            EventBody::Identity(_) => EventType::Identity,
            EventBody::Network(_) => EventType::Network,
            EventBody::User(_) => EventType::User,
            EventBody::Group(_) => EventType::Group,
            EventBody::Channel(_) => EventType::Channel,
            EventBody::Message(_) => EventType::Message,
            EventBody::Invite(_) => EventType::Invite,
            EventBody::Key(_) => EventType::Key,
            EventBody::TransitSecret(_) => EventType::TransitSecret,
            EventBody::Address(_) => EventType::Address,
            EventBody::SyncRequest(_) => EventType::SyncRequest,
        }
    }
}

/// The full plaintext of an event: its typed body plus the signature,
/// which by convention lives alongside the body's own fields rather than
/// wrapping it, so `#[serde(flatten)]` keeps `signature` a sibling key of
/// e.g. `content`/`channel_id` in the canonical JSON form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventPlaintext {
    #[serde(flatten)]
    pub body: EventBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl EventPlaintext {
    pub fn new(body: EventBody) -> Self {
        Self { body, signature: None }
    }

    pub fn event_type(&self) -> EventType {
        self.body.event_type()
    }
}
