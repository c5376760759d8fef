//! Typed projected-view mutations.
//!
//! The original protocol represents a projector's output as a generic
//! `{op, table, data, where}` dict applied via dynamic SQL. Here each
//! mutation a projector can make is a distinct enum variant, so the set of
//! possible writes to the projected view is closed and checked at compile
//! time; `quietd::store::Store::apply_deltas` matches on this enum instead of
//! building SQL strings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRow {
    pub peer_id: String,
    pub network_id: String,
    pub public_key: Vec<u8>,
    pub seal_public_key: Vec<u8>,
    pub added_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub peer_id: String,
    pub network_id: String,
    pub name: Option<String>,
    pub joined_at: i64,
    pub last_address: Option<String>,
    pub last_port: Option<u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkRow {
    pub network_id: String,
    pub name: String,
    pub description: String,
    pub creator_id: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: String,
    pub network_id: String,
    pub name: String,
    pub creator_id: String,
    pub owner_id: String,
    pub created_at: i64,
    pub permissions_json: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupMemberRow {
    pub group_id: String,
    pub user_id: String,
    pub added_by: String,
    pub added_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelRow {
    pub channel_id: String,
    pub group_id: String,
    pub network_id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: i64,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub message_id: String,
    pub channel_id: String,
    pub group_id: String,
    pub network_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InviteRow {
    pub invite_code: String,
    pub network_id: String,
    pub inviter_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub target_user_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddressRow {
    pub address_id: String,
    pub peer_id: String,
    pub user_id: String,
    pub network_id: String,
    pub address: String,
    pub port: u16,
    pub is_active: bool,
    pub timestamp: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerTransitKeyRow {
    pub transit_key_id: String,
    pub peer_id: String,
    pub network_id: String,
    pub created_at: i64,
}

/// One atomic projected-view mutation. A projector returns `Vec<Delta>`;
/// the store applies the whole batch inside the handler's write transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Delta {
    InsertPeer(PeerRow),
    InsertUser(UserRow),
    InsertNetwork(NetworkRow),
    InsertGroup(GroupRow),
    InsertGroupMember(GroupMemberRow),
    RemoveGroupMember { group_id: String, user_id: String },
    InsertChannel(ChannelRow),
    DeleteChannel { channel_id: String },
    InsertMessage(MessageRow),
    DeleteMessage { message_id: String },
    InsertInvite(InviteRow),
    MarkInviteUsed { invite_code: String, used_by: String, used_at: i64 },
    InsertAddress(AddressRow),
    DeactivateAddress { address_id: String },
    InsertPeerTransitKey(PeerTransitKeyRow),
}
