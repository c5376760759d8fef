//! One module per spec §4.3 handler.

pub mod decrypt_transit;
pub mod event_crypto;
pub mod event_store;
pub mod membership;
pub mod outgoing;
pub mod project;
pub mod receive_from_network;
pub mod remove;
pub mod resolve_deps;
pub mod signature;
pub mod sync;
pub mod validate;
