//! Canonical encoding for the envelope pipeline (spec §4.1).
//!
//! The signing input for an event is its plaintext, minus the `signature`
//! field, serialized to JSON with lexicographically sorted keys at every
//! level, no insignificant whitespace, UTF-8, and NUL-padded (or rejected,
//! never truncated) to exactly [`CANONICAL_LEN`] bytes.
//!
//! Key sorting falls out of `serde_json::Value`'s map representation: this
//! crate does not enable `serde_json`'s `preserve_order` feature, so
//! `Value::Object` is backed by a `BTreeMap` and both top-level and nested
//! object keys serialize in sorted order automatically.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::EventPlaintext;

/// The fixed frame size every canonical encoding must fit inside.
pub const CANONICAL_LEN: usize = 512;

/// Serialize `value` to sorted-key compact JSON, then pad with trailing NUL
/// bytes to exactly [`CANONICAL_LEN`]. Fails rather than truncates if the
/// compact JSON form is already too large — callers must keep event content
/// within the protocol's own size limits (e.g. message content length).
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<[u8; CANONICAL_LEN]> {
    let json = serde_json::to_vec(value)?;
    if json.len() > CANONICAL_LEN {
        return Err(Error::CanonicalTooLarge { len: json.len() });
    }
    let mut out = [0u8; CANONICAL_LEN];
    out[..json.len()].copy_from_slice(&json);
    Ok(out)
}

/// Canonical signing bytes for an event plaintext: the body's fields plus
/// every sibling field except `signature`, sorted and padded per
/// [`canonical_bytes`].
pub fn canonicalize_plaintext(plaintext: &EventPlaintext) -> Result<[u8; CANONICAL_LEN]> {
    let mut value = serde_json::to_value(plaintext)?;
    if let Value::Object(map) = &mut value {
        map.remove("signature");
    }
    canonical_bytes(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBody, IdentityEvent};

    fn sample_plaintext() -> EventPlaintext {
        let mut p = EventPlaintext::new(EventBody::Identity(IdentityEvent {
            peer_id: "ab".repeat(32),
            network_id: "net1".into(),
            name: Some("Alice".into()),
            created_at: 1_700_000_000_000,
            invite_code: None,
        }));
        p.signature = Some("deadbeef".into());
        p
    }

    #[test]
    fn canonical_bytes_are_deterministic() {
        let p = sample_plaintext();
        let a = canonicalize_plaintext(&p).unwrap();
        let b = canonicalize_plaintext(&p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_bytes_are_exactly_fixed_length() {
        let p = sample_plaintext();
        let bytes = canonicalize_plaintext(&p).unwrap();
        assert_eq!(bytes.len(), CANONICAL_LEN);
    }

    #[test]
    fn canonical_bytes_exclude_signature() {
        let mut p = sample_plaintext();
        let with_sig = canonicalize_plaintext(&p).unwrap();
        p.signature = Some("00000000".into());
        let other_sig = canonicalize_plaintext(&p).unwrap();
        assert_eq!(with_sig, other_sig);
    }

    #[test]
    fn keys_are_sorted_at_every_level() {
        let p = sample_plaintext();
        let mut value = serde_json::to_value(&p).unwrap();
        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        let json = serde_json::to_vec(&value).unwrap();
        let text = String::from_utf8(json).unwrap();
        // "created_at" sorts before "name", which sorts before "network_id".
        let created_at_pos = text.find("created_at").unwrap();
        let name_pos = text.find("\"name\"").unwrap();
        let network_id_pos = text.find("network_id").unwrap();
        assert!(created_at_pos < name_pos);
        assert!(name_pos < network_id_pos);
    }

    #[test]
    fn oversized_plaintext_is_rejected_not_truncated() {
        let mut p = sample_plaintext();
        if let EventBody::Identity(ref mut id) = p.body {
            id.name = Some("x".repeat(CANONICAL_LEN));
        }
        let err = canonicalize_plaintext(&p).unwrap_err();
        assert!(matches!(err, Error::CanonicalTooLarge { .. }));
    }
}
