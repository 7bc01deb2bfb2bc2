//! Error kinds for the replication core.
//!
//! Scoped per §7: a malformed byte never taints anything above the message
//! it was found in, and nothing below a single component survives a corrupt
//! component.

use crate::registry::FnsId;

/// Failures from the compact entity/varint codec (module A) and the
/// [`SerializedData`](crate::serialized_data::SerializedData) buffer (module B).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// A varint used more than 10 continuation bytes, or the buffer ran out
    /// mid-value.
    #[error("malformed varint")]
    Malformed,
    /// The buffer was exhausted before the requested number of bytes could
    /// be read.
    #[error("buffer exhausted after {read} of {requested} bytes")]
    BufferExhausted { read: usize, requested: usize },
    /// Delta-encoding was requested for a sequence that isn't nondecreasing.
    #[error("entities must be sorted ascending to delta-encode")]
    OutOfOrder,
}

/// Failures from the replication registry (module C).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// `deserialize` was asked for an id with no registered component type.
    #[error("no component registered for fns id {0:?}")]
    UnknownId(FnsId),
    /// The same logical component type was registered twice.
    #[error("component type already registered")]
    AlreadyRegistered,
    /// A registered serialize closure returned an error.
    #[error("failed to serialize component: {0}")]
    SerializeFailed(#[source] postcard::Error),
    /// A registered deserialize closure returned an error.
    #[error("failed to deserialize component: {0}")]
    DeserializeFailed(#[source] postcard::Error),
}

/// Failures while applying a received message on the client (module F).
///
/// Always scoped to a single message: the applicator logs and drops the
/// message, it never disconnects the client over this.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no component registered for fns id {0:?}")]
    UnknownComponent(FnsId),
}

impl ApplyError {
    /// A stable key for this failure's *kind*, ignoring the specific bytes
    /// or id involved, for the "log once per minute per kind" throttling
    /// §7 asks for on malformed wire data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Codec(CodecError::Malformed) => "codec-malformed",
            Self::Codec(CodecError::BufferExhausted { .. }) => "codec-buffer-exhausted",
            Self::Codec(CodecError::OutOfOrder) => "codec-out-of-order",
            Self::UnknownComponent(_) => "unknown-component",
        }
    }
}
