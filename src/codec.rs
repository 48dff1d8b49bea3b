//! The codec protocol.

use std::any::TypeId;

use async_trait::async_trait;

use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;
use crate::owner::ServiceLookupError;
use crate::wire;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Encode(#[from] wire::EncodeError),
    #[error(transparent)]
    Decode(#[from] wire::DecodeError),
    #[error("no codec is bound for value type {type_id:?}")]
    UnsupportedValue { type_id: TypeId },
    #[error("unknown codec tag {tag}")]
    UnknownTag { tag: u8 },
    #[error("unknown record type token `{token}`")]
    UnknownType { token: String },
    #[error(transparent)]
    ServiceLookup(#[from] ServiceLookupError),
    #[error("codec suspended while immediate mode was active")]
    Suspended,
    #[error("deferred value was dropped before being completed")]
    DeferredAbandoned,
    #[error("deferred value resolution re-entered itself")]
    DeferredCycle,
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

/// A context-sensitive encoder/decoder pair for dynamically typed values.
///
/// Codecs are resolved from the current isolate rather than from a global
/// table, so the same runtime type can be carried differently depending on
/// which isolation scope is active. Both halves are async because producing
/// or consuming a value may have to wait for work that has not finished.
#[async_trait(?Send)]
pub trait Codec {
    /// Writes one value to the stream.
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError>;

    /// Reads one value from the stream.
    ///
    /// Implementations that decode state which may refer back to the value
    /// under construction must register the instance with the context
    /// before reading that state.
    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError>;
}
