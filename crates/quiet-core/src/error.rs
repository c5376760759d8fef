//! Error kinds shared by the envelope pipeline.

use thiserror::Error;

/// Result type alias using our `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for the quiet protocol core.
///
/// These are kinds, not exception hierarchies: every handler that can fail
/// reports one of these, and the pipeline runner decides the recovery policy
/// per kind (see `quietd::pipeline::runner`).
#[derive(Debug, Error)]
pub enum Error {
    /// Datagram too short, or plaintext did not parse as the expected JSON shape.
    #[error("input malformed: {0}")]
    InputMalformed(String),

    /// Transit or event-layer key absent from the store when one was required.
    #[error("key missing: {0}")]
    KeyMissing(String),

    /// AEAD open failed (wrong key, tampered ciphertext, or wrong nonce).
    #[error("decrypt failed")]
    DecryptFailed,

    /// Ed25519 signature did not verify, or was absent where required.
    #[error("signature invalid")]
    SignatureBad,

    /// Event-type validator rejected the plaintext.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// One or more `deps` entries do not yet resolve to a validated, unpurged event.
    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    /// A blocked envelope exceeded the retry cap and was dropped from the dependency index.
    #[error("retry exhausted for event {0}")]
    RetryExhausted(String),

    /// A store write lost a race at the request scope.
    #[error("store conflict")]
    StoreConflict,

    /// `event_id` already exists as a purged tombstone; resubmission is rejected.
    #[error("event {0} was previously purged")]
    PurgedDuplicate(String),

    /// Underlying transport (send or receive) failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// `event_type` does not match any registered validator/projector.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Signer is not a member of the group/network the event targets.
    #[error("not a member: {0}")]
    NotMember(String),

    /// A write was attempted through a read-only view.
    #[error("permission denied: write attempted via read-only view")]
    PermissionDenied,

    /// Canonical encoding would exceed the fixed 512-byte frame; refused rather than truncated.
    #[error("canonical encoding too large: {len} bytes (limit 512)")]
    CanonicalTooLarge { len: usize },

    /// Content hash did not match the ID carried alongside it.
    #[error("hash mismatch: computed {computed} != claimed {claimed}")]
    HashMismatch { computed: String, claimed: String },

    /// JSON (de)serialization error, surfaced from `serde_json`.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid public/private key bytes.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}
