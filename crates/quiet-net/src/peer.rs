//! Peer/address bookkeeping — the `addresses` projected table's shape.

use serde::{Deserialize, Serialize};

/// A peer's identity key, hex-encoded — the same string form carried in
/// envelopes as `peer_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn from_public_key_hex(public_key_hex: impl Into<String>) -> Self {
        Self(public_key_hex.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peer's last-known network address, as projected into the `addresses`
/// table (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub network_id: String,
    pub address: String,
    pub port: u16,
    pub is_active: bool,
    pub last_seen_ms: i64,
}

impl PeerInfo {
    pub fn new(peer_id: PeerId, network_id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            peer_id,
            network_id: network_id.into(),
            address: address.into(),
            port,
            is_active: true,
            last_seen_ms: 0,
        }
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.last_seen_ms = now_ms;
        self.is_active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_info_touch_marks_active_and_updates_timestamp() {
        let mut info = PeerInfo::new(PeerId::from_public_key_hex("ab".repeat(32)), "net1", "127.0.0.1", 9000);
        info.is_active = false;
        info.touch(12345);
        assert!(info.is_active);
        assert_eq!(info.last_seen_ms, 12345);
    }
}
