//! Built-in codecs.
//!
//! [`Bindings`] is the composite entry point: it maps runtime types to
//! member codecs on the write side and dispatch tags to the same members on
//! the read side. The member set and its order are part of the stream
//! protocol; both sides must build their bindings identically.

pub mod deferred;
pub mod scalars;
pub mod sequence;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{Codec, CodecError};
use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;
use crate::record::{RecordCodec, RecordRegistry};

pub use deferred::{DeferredCodec, DeferredHandle, DeferredValue};
pub use scalars::{BoolCodec, BytesCodec, F64Codec, I64Codec, StringCodec, U64Codec};
pub use sequence::SequenceCodec;

/// Tag written in place of a value no codec could carry. Decodes to
/// [`Unsupported`].
const UNSUPPORTED_TAG: u8 = 0;

/// Placeholder decoded where an unsupported value was skipped at encode
/// time inside a tolerant region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unsupported;

struct FallbackBinding {
    index: usize,
    registry: RecordRegistry,
}

/// Composite codec dispatching on runtime type (write) and tag (read).
///
/// Tags are assigned in binding order starting at 1; tag 0 is reserved for
/// the unsupported-value placeholder.
#[derive(Default)]
pub struct Bindings {
    entries: Vec<Rc<dyn Codec>>,
    by_type: HashMap<TypeId, usize>,
    fallback: Option<FallbackBinding>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Binds values of type `T` to `codec`. Panics if `T` is already bound.
    pub fn bind<T: Any>(mut self, codec: Rc<dyn Codec>) -> Self {
        let index = self.push_entry(codec);
        let prev = self.by_type.insert(TypeId::of::<T>(), index);
        assert!(
            prev.is_none(),
            "type `{}` bound twice",
            std::any::type_name::<T>()
        );
        self
    }

    /// Binds every record type in `registry` through a [`RecordCodec`].
    /// Used as the fallback for types without an explicit binding.
    pub fn bind_records(mut self, registry: RecordRegistry) -> Self {
        assert!(self.fallback.is_none(), "record fallback bound twice");
        let codec: Rc<dyn Codec> = Rc::new(RecordCodec::new(registry.clone()));
        let index = self.push_entry(codec);
        self.fallback = Some(FallbackBinding { index, registry });
        self
    }

    fn push_entry(&mut self, codec: Rc<dyn Codec>) -> usize {
        assert!(
            self.entries.len() < u8::MAX as usize,
            "too many codec bindings"
        );
        self.entries.push(codec);
        self.entries.len() - 1
    }

    fn binding_for(&self, type_id: TypeId) -> Option<usize> {
        if let Some(&index) = self.by_type.get(&type_id) {
            return Some(index);
        }
        let fallback = self.fallback.as_ref()?;
        fallback.registry.contains_type(type_id).then_some(fallback.index)
    }

    /// The standard binding set: scalars, text, byte blocks, sequences,
    /// deferred values, and the given record types.
    pub fn standard(records: RecordRegistry) -> Rc<Bindings> {
        Rc::new(
            Bindings::new()
                .bind::<bool>(Rc::new(BoolCodec))
                .bind::<u64>(Rc::new(U64Codec))
                .bind::<i64>(Rc::new(I64Codec))
                .bind::<f64>(Rc::new(F64Codec))
                .bind::<String>(Rc::new(StringCodec))
                .bind::<Bytes>(Rc::new(BytesCodec))
                .bind::<Vec<Instance>>(Rc::new(SequenceCodec))
                .bind::<DeferredValue>(Rc::new(DeferredCodec))
                .bind_records(records),
        )
    }
}

#[async_trait(?Send)]
impl Codec for Bindings {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        let type_id = (**value).type_id();
        if let Some(index) = self.binding_for(type_id) {
            ctx.write_tag(index as u8 + 1)?;
            return self.entries[index].encode(ctx, value).await;
        }
        if ctx.tolerates_incompatible_types() {
            ctx.report_problem("value of an unregistered runtime type cannot be serialized");
            return ctx.write_tag(UNSUPPORTED_TAG);
        }
        Err(CodecError::UnsupportedValue { type_id })
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        let tag = ctx.read_tag()?;
        if tag == UNSUPPORTED_TAG {
            return Ok(Rc::new(Unsupported) as Instance);
        }
        let index = (tag - 1) as usize;
        let codec = self
            .entries
            .get(index)
            .ok_or(CodecError::UnknownTag { tag })?
            .clone();
        codec.decode(ctx).await
    }
}
