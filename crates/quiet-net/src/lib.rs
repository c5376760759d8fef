//! The transport boundary for the quiet protocol.
//!
//! This crate deliberately carries no protocol logic: it knows how to send
//! and receive raw datagrams, and how to remember a peer's last-known
//! address. Framing, crypto, and the wire format for the envelope pipeline
//! all live in `quiet-core`/`quietd` instead.

pub mod peer;
pub mod transport;

pub use peer::{PeerId, PeerInfo};
pub use transport::{Inbound, Transport, TransportError, UdpTransport, MAX_DATAGRAM_BYTES};
