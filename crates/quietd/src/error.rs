//! Top-level `quietd` error, composing the lower crates' typed errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] quiet_core::Error),

    #[error(transparent)]
    Transport(#[from] quiet_net::TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("command not found: {0}")]
    UnknownCommand(String),

    #[error("query not found: {0}")]
    UnknownQuery(String),
}

/// Storage-layer failures. Kept distinct from `quiet_core::Error` because
/// `sled`'s own error type and our schema-level invariants (row decode
/// failures, tree-open failures) live below the protocol's error taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("row decode error: {0}")]
    Decode(#[from] postcard::Error),
    #[error("permission denied: write attempted via read-only view")]
    PermissionDenied,
}
