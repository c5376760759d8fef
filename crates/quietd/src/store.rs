//! The event store and projected view (spec §3).
//!
//! One `sled::Tree` per logical table, rows encoded with `postcard`. The
//! capability split the original expresses as a runtime read-only SQL
//! wrapper (`core/readonly_db.py`'s keyword-sniffing `ReadOnlyConnection`)
//! is realized here at the type level instead: [`ReadStore`] only ever
//! exposes `get`/`scan` methods, and [`WriteStore`] (which derefs to
//! `ReadStore`) is the only handle with `apply_deltas`/`put_event`/etc. A
//! query or scheduler job that only ever receives a `&ReadStore` cannot
//! write no matter what it tries — the compiler enforces it, not a string
//! prefix check.

use std::path::Path;

use quiet_core::Delta;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// A persisted, not-yet-decrypted event row (spec §3 `events` table).
#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub event_type: String,
    pub event_ciphertext: Vec<u8>,
    pub event_key_id: Option<String>,
    pub received_at: i64,
    pub origin_ip: Option<String>,
    pub origin_port: Option<u16>,
    pub stored_at: i64,
    pub purged: bool,
    pub purged_at: Option<i64>,
    pub purged_reason: Option<String>,
    pub ttl_expire_at: Option<i64>,
    pub validated: bool,
}

/// A dependency-blocked envelope snapshot (spec §3 `blocked_events`).
#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct BlockedEvent {
    pub event_id: String,
    pub envelope_blob: Vec<u8>,
    pub created_at: i64,
    pub missing_deps_json: String,
    pub retry_count: u32,
}

#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct SigningKeyRow {
    pub peer_id: String,
    pub private_key: String,
    /// Hex X25519 private key, for opening sealed-box key distributions
    /// addressed to this identity. Generated alongside `private_key` at
    /// `create_identity` time.
    pub seal_private_key: String,
}

#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct TransitKeyRow {
    pub transit_key_id: String,
    pub transit_secret: [u8; 32],
    pub network_id: String,
}

/// A group/channel secret this node has unsealed, keyed by `group_id`
/// (spec §4.3.5 "Unseal"). Only one active symmetric key per group is
/// tracked; a later key event for the same group overwrites it, which is
/// the crate's chosen model for key rotation (see DESIGN.md).
#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct UnsealedKeyRow {
    pub group_id: String,
    pub secret: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, serde::Deserialize)]
pub struct JobState {
    pub job_name: String,
    pub state_json: String,
    pub updated_ms: i64,
}

#[derive(Clone, Debug, Default, Serialize, serde::Deserialize)]
pub struct JobRun {
    pub job_name: String,
    pub last_run_ms: i64,
    pub last_success_ms: i64,
    pub last_failure_ms: i64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_state: String,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Read-only capability over every table. Queries and job bodies receive
/// only this type (spec §4.4, §6 "read-only cursor view").
pub struct ReadStore {
    db: sled::Db,
}

macro_rules! tree_accessors {
    ($($tree:ident => $name:literal),+ $(,)?) => {
        $(
            fn $tree(&self) -> Result<sled::Tree> {
                Ok(self.db.open_tree($name)?)
            }
        )+
    };
}

impl ReadStore {
    tree_accessors! {
        events_tree => "events",
        peers_tree => "peers",
        users_tree => "users",
        networks_tree => "networks",
        groups_tree => "groups",
        group_members_tree => "group_members",
        channels_tree => "channels",
        messages_tree => "messages",
        invites_tree => "invites",
        addresses_tree => "addresses",
        peer_transit_keys_tree => "peer_transit_keys",
        blocked_events_tree => "blocked_events",
        blocked_event_deps_tree => "blocked_event_deps",
        signing_keys_tree => "signing_keys",
        transit_keys_tree => "transit_keys",
        unsealed_keys_tree => "unsealed_keys",
        job_states_tree => "job_states",
        job_runs_tree => "job_runs",
    }

    pub fn get_event(&self, event_id: &str) -> Result<Option<EventRow>> {
        match self.events_tree()?.get(event_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// True once `event_id` has a row at all, purged or not — the shape
    /// used by the event-store and remove handlers to decide between
    /// "insert" and "already seen" (spec §4.3.3, §4.3.9).
    pub fn has_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.events_tree()?.contains_key(event_id)?)
    }

    pub fn is_tombstoned(&self, event_id: &str) -> Result<bool> {
        Ok(self.get_event(event_id)?.map(|row| row.purged).unwrap_or(false))
    }

    /// Satisfied per spec §4.3.2: a row exists, is validated, and is not purged.
    pub fn is_validated_and_unpurged(&self, event_id: &str) -> Result<bool> {
        Ok(self
            .get_event(event_id)?
            .map(|row| row.validated && !row.purged)
            .unwrap_or(false))
    }

    pub fn recent_events_for_network(&self, network_id: &str, limit: usize) -> Result<Vec<EventRow>> {
        let mut out = Vec::new();
        for item in self.events_tree()?.iter() {
            let (_, bytes) = item?;
            let row: EventRow = decode(&bytes)?;
            if !row.purged && row.validated {
                // network membership isn't encoded on the raw row; callers
                // filter by decrypted plaintext network_id upstream. This
                // scan exists to give the sync-request handler a bounded
                // candidate set without re-decrypting everything twice.
                out.push(row);
            }
            if out.len() >= limit {
                break;
            }
        }
        let _ = network_id;
        Ok(out)
    }

    /// Every identity this node itself holds a signing key for — the set
    /// of identities it can act as (scheduler's `sync_request` job, a
    /// future multi-identity CLI). Grounded on `dump`'s own full-tree-scan
    /// pattern.
    pub fn list_local_identities(&self) -> Result<Vec<SigningKeyRow>> {
        let mut out = Vec::new();
        for item in self.signing_keys_tree()?.iter() {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    pub fn get_signing_key(&self, peer_id: &str) -> Result<Option<SigningKeyRow>> {
        match self.signing_keys_tree()?.get(peer_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_transit_key(&self, transit_key_id: &str) -> Result<Option<TransitKeyRow>> {
        match self.transit_keys_tree()?.get(transit_key_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_unsealed_key(&self, group_id: &str) -> Result<Option<UnsealedKeyRow>> {
        match self.unsealed_keys_tree()?.get(group_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_blocked(&self, event_id: &str) -> Result<Option<BlockedEvent>> {
        match self.blocked_events_tree()?.get(event_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Waiters currently blocked on `dep_id` (spec §4.3.2 unblock step).
    pub fn waiters_for_dep(&self, dep_id: &str) -> Result<Vec<String>> {
        let prefix = format!("{dep_id}\0");
        let mut out = Vec::new();
        for item in self.blocked_event_deps_tree()?.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            if let Some(event_id) = std::str::from_utf8(&key).ok().and_then(|s| s.rsplit('\0').next()) {
                out.push(event_id.to_string());
            }
        }
        Ok(out)
    }

    pub fn get_group(&self, group_id: &str) -> Result<Option<quiet_core::delta::GroupRow>> {
        match self.groups_tree()?.get(group_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_group_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let key = format!("{group_id}\0{user_id}");
        Ok(self.group_members_tree()?.contains_key(key)?)
    }

    pub fn list_group_members(&self, group_id: &str) -> Result<Vec<quiet_core::delta::GroupMemberRow>> {
        let prefix = format!("{group_id}\0");
        let mut out = Vec::new();
        for item in self.group_members_tree()?.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    pub fn get_invite(&self, invite_code: &str) -> Result<Option<quiet_core::delta::InviteRow>> {
        match self.invites_tree()?.get(invite_code)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_peer(&self, peer_id: &str) -> Result<Option<quiet_core::delta::PeerRow>> {
        match self.peers_tree()?.get(peer_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// A projected identity *is* its `PeerRow` — `get_identity` is `get_peer`
    /// under the name queries use, since nothing beyond signing/sealing keys
    /// and network membership survives projection for an `identity` event.
    pub fn get_identity(&self, peer_id: &str) -> Result<Option<quiet_core::delta::PeerRow>> {
        self.get_peer(peer_id)
    }

    pub fn list_identities_for_network(&self, network_id: &str) -> Result<Vec<quiet_core::delta::PeerRow>> {
        let mut out = Vec::new();
        for item in self.peers_tree()?.iter() {
            let (_, bytes) = item?;
            let row: quiet_core::delta::PeerRow = decode(&bytes)?;
            if row.network_id == network_id {
                out.push(row);
            }
        }
        Ok(out)
    }

    pub fn get_network(&self, network_id: &str) -> Result<Option<quiet_core::delta::NetworkRow>> {
        match self.networks_tree()?.get(network_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_groups_for_network(&self, network_id: &str) -> Result<Vec<quiet_core::delta::GroupRow>> {
        let mut out = Vec::new();
        for item in self.groups_tree()?.iter() {
            let (_, bytes) = item?;
            let row: quiet_core::delta::GroupRow = decode(&bytes)?;
            if row.network_id == network_id {
                out.push(row);
            }
        }
        Ok(out)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<quiet_core::delta::UserRow>> {
        match self.users_tree()?.get(user_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_peer_id(&self, peer_id: &str) -> Result<Option<quiet_core::delta::UserRow>> {
        for item in self.users_tree()?.iter() {
            let (_, bytes) = item?;
            let row: quiet_core::delta::UserRow = decode(&bytes)?;
            if row.peer_id == peer_id {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    pub fn list_users_for_network(&self, network_id: &str) -> Result<Vec<quiet_core::delta::UserRow>> {
        let mut out = Vec::new();
        for item in self.users_tree()?.iter() {
            let (_, bytes) = item?;
            let row: quiet_core::delta::UserRow = decode(&bytes)?;
            if row.network_id == network_id {
                out.push(row);
            }
        }
        Ok(out)
    }

    pub fn list_channels_for_group(&self, group_id: &str) -> Result<Vec<quiet_core::delta::ChannelRow>> {
        let mut out = Vec::new();
        for item in self.channels_tree()?.iter() {
            let (_, bytes) = item?;
            let row: quiet_core::delta::ChannelRow = decode(&bytes)?;
            if row.group_id == group_id {
                out.push(row);
            }
        }
        Ok(out)
    }

    pub fn get_channel(&self, channel_id: &str) -> Result<Option<quiet_core::delta::ChannelRow>> {
        match self.channels_tree()?.get(channel_id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_messages_for_channel(&self, channel_id: &str) -> Result<Vec<quiet_core::delta::MessageRow>> {
        let prefix = format!("{channel_id}\0");
        let mut out = Vec::new();
        for item in self.messages_tree()?.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    pub fn list_addresses_for_peer(&self, peer_id: &str) -> Result<Vec<quiet_core::delta::AddressRow>> {
        let prefix = format!("{peer_id}\0");
        let mut out = Vec::new();
        for item in self.addresses_tree()?.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    /// Find an address row by its own id (addresses are keyed by
    /// `peer_id\0address_id`, so this is a scan rather than a point lookup —
    /// used by the outgoing path to turn `address_id` into `dest_ip:dest_port`
    /// (spec §4.3.10 Check-outgoing)).
    pub fn get_address(&self, address_id: &str) -> Result<Option<quiet_core::delta::AddressRow>> {
        let suffix = format!("\0{address_id}");
        for item in self.addresses_tree()?.iter() {
            let (k, v) = item?;
            if std::str::from_utf8(&k).map(|s| s.ends_with(&suffix)).unwrap_or(false) {
                return Ok(Some(decode(&v)?));
            }
        }
        Ok(None)
    }

    pub fn get_peer_transit_key(&self, peer_id: &str, network_id: &str) -> Result<Option<String>> {
        let key = format!("{peer_id}\0{network_id}");
        match self.peer_transit_keys_tree()?.get(key)? {
            Some(bytes) => {
                let row: quiet_core::delta::PeerTransitKeyRow = decode(&bytes)?;
                Ok(Some(row.transit_key_id))
            }
            None => Ok(None),
        }
    }

    pub fn get_job_state(&self, job_name: &str) -> Result<Option<JobState>> {
        match self.job_states_tree()?.get(job_name)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_job_run(&self, job_name: &str) -> Result<JobRun> {
        match self.job_runs_tree()?.get(job_name)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(JobRun { job_name: job_name.to_string(), ..Default::default() }),
        }
    }

    /// Schema + every row, for the `dump_database` debug capability (§6).
    pub fn dump(&self) -> Result<serde_json::Value> {
        let mut out = serde_json::Map::new();
        for name in [
            "events", "peers", "users", "networks", "groups", "group_members", "channels",
            "messages", "invites", "addresses", "peer_transit_keys", "blocked_events",
            "blocked_event_deps", "job_states", "job_runs",
        ] {
            let tree = self.db.open_tree(name)?;
            let mut rows = Vec::new();
            for item in tree.iter() {
                let (k, v) = item?;
                rows.push(serde_json::json!({
                    "key": String::from_utf8_lossy(&k),
                    "value_len": v.len(),
                }));
            }
            out.insert(name.to_string(), serde_json::Value::Array(rows));
        }
        Ok(serde_json::Value::Object(out))
    }
}

/// The write capability. Derefs to [`ReadStore`] so every read method is
/// available without duplication; only code holding a `&WriteStore`
/// (handlers, the runner, the scheduler's job-state persistence) can call
/// the mutating methods below.
pub struct WriteStore {
    inner: ReadStore,
}

impl std::ops::Deref for WriteStore {
    type Target = ReadStore;
    fn deref(&self) -> &ReadStore {
        &self.inner
    }
}

impl WriteStore {
    pub fn put_event(&self, row: &EventRow) -> Result<()> {
        self.inner.events_tree()?.insert(row.event_id.as_bytes(), encode(row)?)?;
        Ok(())
    }

    pub fn mark_stored(&self, event_id: &str) -> Result<()> {
        if let Some(mut row) = self.inner.get_event(event_id)? {
            row.stored_at = now_ms();
            self.put_event(&row)?;
        }
        Ok(())
    }

    pub fn mark_validated(&self, event_id: &str, validated: bool) -> Result<()> {
        if let Some(mut row) = self.inner.get_event(event_id)? {
            row.validated = validated;
            self.put_event(&row)?;
        }
        Ok(())
    }

    /// Mark `event_id` purged with a 7-day TTL (spec §4.3.7, §4.3.9, Design
    /// Notes "Purge TTL semantics"). The row's `event_id` is retained so a
    /// resubmission is rejected (`PurgedDuplicate`), but the projected rows
    /// it produced are removed.
    pub fn purge_event(&self, event_id: &str, reason: &str) -> Result<()> {
        let now = now_ms();
        if let Some(mut row) = self.inner.get_event(event_id)? {
            row.purged = true;
            row.purged_at = Some(now);
            row.purged_reason = Some(reason.to_string());
            row.ttl_expire_at = Some(now + 7 * 24 * 60 * 60 * 1000);
            self.put_event(&row)?;
        } else {
            self.put_event(&EventRow {
                event_id: event_id.to_string(),
                event_type: "unknown".to_string(),
                event_ciphertext: Vec::new(),
                event_key_id: None,
                received_at: now,
                origin_ip: None,
                origin_port: None,
                stored_at: now,
                purged: true,
                purged_at: Some(now),
                purged_reason: Some(reason.to_string()),
                ttl_expire_at: Some(now + 7 * 24 * 60 * 60 * 1000),
                validated: false,
            })?;
        }
        Ok(())
    }

    pub fn put_signing_key(&self, row: &SigningKeyRow) -> Result<()> {
        self.inner.signing_keys_tree()?.insert(row.peer_id.as_bytes(), encode(row)?)?;
        Ok(())
    }

    pub fn put_transit_key(&self, row: &TransitKeyRow) -> Result<()> {
        self.inner.transit_keys_tree()?.insert(row.transit_key_id.as_bytes(), encode(row)?)?;
        Ok(())
    }

    pub fn put_unsealed_key(&self, row: &UnsealedKeyRow) -> Result<()> {
        self.inner.unsealed_keys_tree()?.insert(row.group_id.as_bytes(), encode(row)?)?;
        Ok(())
    }

    pub fn block_event(&self, blocked: &BlockedEvent) -> Result<()> {
        self.inner.blocked_events_tree()?.insert(blocked.event_id.as_bytes(), encode(blocked)?)?;
        Ok(())
    }

    pub fn index_blocked_dep(&self, event_id: &str, dep_id: &str) -> Result<()> {
        let key = format!("{dep_id}\0{event_id}");
        self.inner.blocked_event_deps_tree()?.insert(key.as_bytes(), &[])?;
        Ok(())
    }

    pub fn unblock_event(&self, event_id: &str, missing_deps: &[String]) -> Result<()> {
        self.inner.blocked_events_tree()?.remove(event_id)?;
        for dep_id in missing_deps {
            let key = format!("{dep_id}\0{event_id}");
            self.inner.blocked_event_deps_tree()?.remove(key.as_bytes())?;
        }
        Ok(())
    }

    pub fn put_job_state(&self, state: &JobState) -> Result<()> {
        self.inner.job_states_tree()?.insert(state.job_name.as_bytes(), encode(state)?)?;
        Ok(())
    }

    pub fn put_job_run(&self, run: &JobRun) -> Result<()> {
        self.inner.job_runs_tree()?.insert(run.job_name.as_bytes(), encode(run)?)?;
        Ok(())
    }

    /// The `purge_sweep` job body (spec Design Notes "Purge TTL semantics":
    /// "after TTL, a sweeper (out of scope [of the protocol itself]) may
    /// reclaim them"). Drops every row whose `ttl_expire_at` has passed
    /// entirely, rather than just clearing `purged` — past the 7-day
    /// window there's no longer a duplicate-detection reason to keep the
    /// tombstone around at all. Returns the count reclaimed.
    pub fn reclaim_expired_purges(&self, now_ms: i64) -> Result<usize> {
        let tree = self.inner.events_tree()?;
        let mut expired = Vec::new();
        for item in tree.iter() {
            let (key, bytes) = item?;
            let row: EventRow = decode(&bytes)?;
            if row.purged && row.ttl_expire_at.is_some_and(|t| t <= now_ms) {
                expired.push(key.to_vec());
            }
        }
        for key in &expired {
            tree.remove(key)?;
        }
        Ok(expired.len())
    }

    /// Apply a batch of projector deltas atomically within this write lease
    /// (spec §4.3.8). `Store::write_txn` already holds the process-wide
    /// write mutex for the whole handler pass, so these inserts don't need
    /// their own sled transaction on top.
    pub fn apply_deltas(&self, deltas: &[Delta]) -> Result<()> {
        use quiet_core::Delta::*;
        for delta in deltas {
            match delta {
                InsertPeer(row) => {
                    self.inner.peers_tree()?.insert(row.peer_id.as_bytes(), encode(row)?)?;
                }
                InsertUser(row) => {
                    self.inner.users_tree()?.insert(row.user_id.as_bytes(), encode(row)?)?;
                }
                InsertNetwork(row) => {
                    self.inner.networks_tree()?.insert(row.network_id.as_bytes(), encode(row)?)?;
                }
                InsertGroup(row) => {
                    self.inner.groups_tree()?.insert(row.group_id.as_bytes(), encode(row)?)?;
                }
                InsertGroupMember(row) => {
                    let key = format!("{}\0{}", row.group_id, row.user_id);
                    self.inner.group_members_tree()?.insert(key.as_bytes(), encode(row)?)?;
                }
                RemoveGroupMember { group_id, user_id } => {
                    let key = format!("{group_id}\0{user_id}");
                    self.inner.group_members_tree()?.remove(key.as_bytes())?;
                }
                InsertChannel(row) => {
                    self.inner.channels_tree()?.insert(row.channel_id.as_bytes(), encode(row)?)?;
                }
                DeleteChannel { channel_id } => {
                    self.inner.channels_tree()?.remove(channel_id.as_bytes())?;
                }
                InsertMessage(row) => {
                    let key = format!("{}\0{}", row.channel_id, row.message_id);
                    self.inner.messages_tree()?.insert(key.as_bytes(), encode(row)?)?;
                }
                DeleteMessage { message_id } => {
                    // Messages are keyed by channel_id\0message_id; scan to
                    // find the matching row rather than requiring callers to
                    // carry the channel_id alongside the id to delete.
                    let tree = self.inner.messages_tree()?;
                    let suffix = format!("\0{message_id}");
                    let mut found = None;
                    for item in tree.iter() {
                        let (k, _) = item?;
                        if std::str::from_utf8(&k).map(|s| s.ends_with(&suffix)).unwrap_or(false) {
                            found = Some(k);
                            break;
                        }
                    }
                    if let Some(key) = found {
                        tree.remove(key)?;
                    }
                }
                InsertInvite(row) => {
                    self.inner.invites_tree()?.insert(row.invite_code.as_bytes(), encode(row)?)?;
                }
                MarkInviteUsed { invite_code, .. } => {
                    if let Some(mut row) = self.inner.get_invite(invite_code)? {
                        // Redemption is recorded by the caller clearing the
                        // invite's availability; we keep the row (codes stay
                        // addressable for audit) and just shorten its TTL.
                        row.expires_at = now_ms();
                        self.inner.invites_tree()?.insert(invite_code.as_bytes(), encode(&row)?)?;
                    }
                }
                InsertAddress(row) => {
                    let key = format!("{}\0{}", row.peer_id, row.address_id);
                    self.inner.addresses_tree()?.insert(key.as_bytes(), encode(row)?)?;
                }
                DeactivateAddress { address_id } => {
                    let tree = self.inner.addresses_tree()?;
                    let suffix = format!("\0{address_id}");
                    for item in tree.iter() {
                        let (k, v) = item?;
                        if std::str::from_utf8(&k).map(|s| s.ends_with(&suffix)).unwrap_or(false) {
                            let mut row: quiet_core::delta::AddressRow = decode(&v)?;
                            row.is_active = false;
                            tree.insert(k, encode(&row)?)?;
                            break;
                        }
                    }
                }
                InsertPeerTransitKey(row) => {
                    let key = format!("{}\0{}", row.peer_id, row.network_id);
                    self.inner.peer_transit_keys_tree()?.insert(key.as_bytes(), encode(row)?)?;
                }
            }
        }
        Ok(())
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Owns the database and the single in-process write lease. Concurrent
/// requests are serialized by [`Store::write_txn`] (spec §5): only one
/// handler-runner pass, command, or scheduler tick holds the lease at a
/// time, matching the "run to quiescence, then release" model.
pub struct Store {
    db: sled::Db,
    write_lease: parking_lot::Mutex<()>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db, write_lease: parking_lot::Mutex::new(()) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db, write_lease: parking_lot::Mutex::new(()) })
    }

    pub fn read(&self) -> ReadStore {
        ReadStore { db: self.db.clone() }
    }

    /// Acquire the exclusive write lease and run `f` against a `WriteStore`.
    /// This is the request-scoped unit of work the spec describes: one
    /// command invocation, one incoming packet's handler-runner pass, or one
    /// scheduler tick. Generic over the closure's error type so callers
    /// above this crate's own `StoreError` (e.g. `quietd::Error`, which
    /// composes it via `#[from]`) can use `?` against store operations
    /// directly inside the closure.
    pub fn write_txn<T, E>(&self, f: impl FnOnce(&WriteStore) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.write_lease.lock();
        let store = WriteStore { inner: ReadStore { db: self.db.clone() } };
        f(&store)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_then_reject_duplicate() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.put_event(&EventRow {
                    event_id: "abc".into(),
                    event_type: "message".into(),
                    event_ciphertext: vec![1, 2, 3],
                    event_key_id: None,
                    received_at: 0,
                    origin_ip: None,
                    origin_port: None,
                    stored_at: 0,
                    purged: false,
                    purged_at: None,
                    purged_reason: None,
                    ttl_expire_at: None,
                    validated: true,
                })
            })
            .unwrap();
        store.write_txn(|w| w.purge_event("abc", "validation_failed")).unwrap();

        let read = store.read();
        assert!(read.is_tombstoned("abc").unwrap());
        assert!(!read.is_validated_and_unpurged("abc").unwrap());
    }

    #[test]
    fn apply_deltas_round_trips_peer_insert() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.apply_deltas(&[Delta::InsertPeer(quiet_core::delta::PeerRow {
                    peer_id: "p1".into(),
                    network_id: "n1".into(),
                    public_key: vec![9; 32],
                    seal_public_key: vec![8; 32],
                    added_at: 0,
                })])
            })
            .unwrap();
        let peer = store.read().get_peer("p1").unwrap().unwrap();
        assert_eq!(peer.network_id, "n1");
    }

    #[test]
    fn block_and_unblock_dep_index() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_txn(|w| {
                w.block_event(&BlockedEvent {
                    event_id: "waiter".into(),
                    envelope_blob: vec![],
                    created_at: 0,
                    missing_deps_json: "[\"event:missing\"]".into(),
                    retry_count: 0,
                })?;
                w.index_blocked_dep("waiter", "missing")
            })
            .unwrap();

        assert_eq!(store.read().waiters_for_dep("missing").unwrap(), vec!["waiter".to_string()]);

        store.write_txn(|w| w.unblock_event("waiter", &["missing".to_string()])).unwrap();
        assert!(store.read().waiters_for_dep("missing").unwrap().is_empty());
        assert!(store.read().get_blocked("waiter").unwrap().is_none());
    }
}
