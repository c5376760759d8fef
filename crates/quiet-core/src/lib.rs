//! Envelope and event data model, canonical encoding, and cryptographic
//! primitives for the quiet protocol.
//!
//! This crate has no I/O: it defines the types that flow through the
//! pipeline (`envelope`, `event`, `delta`), the deterministic signing/ID
//! encoding (`canonical`), and the crypto primitives (`crypto`) the pipeline
//! composes. Store, dependency resolution, handlers, commands, queries, and
//! the scheduler all live in `quietd`.

pub mod canonical;
pub mod crypto;
pub mod delta;
pub mod envelope;
pub mod error;
pub mod event;

pub use delta::Delta;
pub use envelope::{DepRef, Envelope, EnvelopeFlags, KeyRef, KeyRefKind, LocalMetadata, ResolvedDep};
pub use error::{Error, Result};
pub use event::{EventBody, EventPlaintext, EventType};
pub use crypto::{CryptoMode, Keypair};
