#![forbid(unsafe_code)]

pub mod codec;
pub mod codecs;
pub mod context;
pub mod identity;
mod isolate;
pub mod limits;
pub mod ops;
pub mod owner;
pub mod problems;
pub mod record;
pub mod trace;
pub mod wire;

// Re-export the protocol surface at crate root for convenience
pub use crate::codec::{Codec, CodecError};
pub use crate::codecs::{Bindings, DeferredHandle, DeferredValue, Unsupported};
pub use crate::context::{ReadContext, WriteContext};
pub use crate::identity::{Instance, instance_key};
pub use crate::limits::Limits;
pub use crate::ops::{
    DecodedGraph, EncodedGraph, GraphDigest, OperationId, decode_graph, encode_graph,
};
pub use crate::owner::{Owner, ServiceLookupError, ServiceMap, ServiceRegistry};
pub use crate::problems::{Problem, ProblemCollector, ProblemReport, ProblemSink};
pub use crate::record::{RecordCodec, RecordRegistry, RecordState, SharedRecordCodec};
pub use crate::trace::{PropertyKind, PropertyTrace};
